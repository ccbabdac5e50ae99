//! UI utilities for the client.

use std::{collections::HashMap, io::Write};

use guildrelay_shared::protocol::GuildMessage;

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// Plain text to send to the focused room
    Say(String),
    Focus(i64),
    Older,
    Unread,
    Help,
    Quit,
    /// An unknown command or a bad argument
    Invalid(String),
}

pub fn parse_input(line: &str) -> InputCommand {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return InputCommand::Say(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("focus"), Some(room)) => match room.trim_start_matches('#').parse() {
            Ok(room_id) => InputCommand::Focus(room_id),
            Err(_) => InputCommand::Invalid(format!("not a room id: {}", room)),
        },
        (Some("focus"), None) => InputCommand::Invalid("usage: /focus <room>".to_string()),
        (Some("older"), _) => InputCommand::Older,
        (Some("unread"), _) => InputCommand::Unread,
        (Some("help"), _) => InputCommand::Help,
        (Some("quit" | "exit"), _) => InputCommand::Quit,
        _ => InputCommand::Invalid(format!("unknown command: {}", line)),
    }
}

pub fn prompt(room_id: i64) -> String {
    format!("#{}> ", room_id)
}

/// Redisplay the prompt after printing a notice
pub fn redisplay_prompt(room_id: i64) {
    print!("{}", prompt(room_id));
    std::io::stdout().flush().ok();
}

/// Remembers the newest message printed per room so that store
/// notifications only print what is new.
#[derive(Debug, Default)]
pub struct RenderCursor {
    last_printed: HashMap<i64, i64>,
}

impl RenderCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of `room_id` newer than the last printed one
    pub fn unseen<'a>(&mut self, room_id: i64, messages: &'a [GuildMessage]) -> Vec<&'a GuildMessage> {
        let last = self.last_printed.get(&room_id).copied();
        let unseen: Vec<&GuildMessage> = messages
            .iter()
            .filter(|message| match (message.id, last) {
                (Some(id), Some(last)) => id > last,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .collect();
        if let Some(newest) = unseen.iter().filter_map(|message| message.id).max() {
            self.last_printed.insert(room_id, newest);
        }
        unseen
    }
}

#[cfg(test)]
mod tests {
    use guildrelay_shared::protocol::WEB_ORIGIN;

    use super::*;

    fn message(id: i64) -> GuildMessage {
        GuildMessage {
            id: Some(id),
            guild_id: 42,
            server: WEB_ORIGIN.to_string(),
            sender: "alice".to_string(),
            message: format!("message {}", id),
            transliterated_message: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_parse_input_plain_text() {
        // テスト項目: スラッシュで始まらない入力は送信テキストになる
        // given (前提条件):
        let line = "  hello there ";

        // when (操作):
        let command = parse_input(line);

        // then (期待する結果):
        assert_eq!(command, InputCommand::Say("hello there".to_string()));
    }

    #[test]
    fn test_parse_input_commands() {
        // テスト項目: 各コマンドが解析される
        // given (前提条件):
        let lines = ["/focus 7", "/focus #42", "/older", "/unread", "/help", "/quit", "/exit"];

        // when (操作):
        let commands: Vec<InputCommand> = lines.iter().map(|line| parse_input(line)).collect();

        // then (期待する結果):
        assert_eq!(
            commands,
            vec![
                InputCommand::Focus(7),
                InputCommand::Focus(42),
                InputCommand::Older,
                InputCommand::Unread,
                InputCommand::Help,
                InputCommand::Quit,
                InputCommand::Quit,
            ]
        );
    }

    #[test]
    fn test_parse_input_invalid_commands() {
        // テスト項目: 不明なコマンドや不正な部屋 ID は Invalid になる
        // given (前提条件):
        let lines = ["/focus", "/focus abc", "/dance"];

        // when (操作):
        let commands: Vec<InputCommand> = lines.iter().map(|line| parse_input(line)).collect();

        // then (期待する結果):
        assert!(
            commands
                .iter()
                .all(|command| matches!(command, InputCommand::Invalid(_)))
        );
    }

    #[test]
    fn test_render_cursor_prints_each_message_once() {
        // テスト項目: 一度表示したメッセージは次の通知で再表示されない
        // given (前提条件):
        let mut cursor = RenderCursor::new();
        let first = vec![message(1), message(2)];
        let second = vec![message(1), message(2), message(3)];

        // when (操作):
        let initial: Vec<Option<i64>> = cursor.unseen(42, &first).iter().map(|m| m.id).collect();
        let next: Vec<Option<i64>> = cursor.unseen(42, &second).iter().map(|m| m.id).collect();
        let again = cursor.unseen(42, &second).len();

        // then (期待する結果):
        assert_eq!(initial, vec![Some(1), Some(2)]);
        assert_eq!(next, vec![Some(3)]);
        assert_eq!(again, 0);
    }

    #[test]
    fn test_render_cursor_ignores_backfilled_messages() {
        // テスト項目: 過去ページとして前に追加されたメッセージは新着として表示されない
        // given (前提条件):
        let mut cursor = RenderCursor::new();
        cursor.unseen(42, &[message(10)]);

        let backfilled = [message(8), message(9), message(10)];

        // when (操作):
        let unseen = cursor.unseen(42, &backfilled);

        // then (期待する結果):
        assert!(unseen.is_empty());
    }
}
