//! Message formatting utilities for client display.

use guildrelay_shared::{protocol::GuildMessage, time::timestamp_to_rfc3339};

use crate::{domain::ConnectionPhase, unread::UnreadCounts};

const RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The message as received from the relay
    ///
    /// # Returns
    ///
    /// A framed block with sender, origin server, body and send time. The
    /// transliterated body is shown on its own line when present.
    pub fn format_guild_message(message: &GuildMessage) -> String {
        let mut output = format!(
            "\n{}\n@{} [{}]: {}\n",
            RULE, message.sender, message.server, message.message
        );
        if let Some(transliterated) = &message.transliterated_message {
            output.push_str(&format!("({})\n", transliterated));
        }
        output.push_str(&format!(
            "sent at {}\n{}\n",
            timestamp_to_rfc3339(message.timestamp),
            RULE
        ));
        output
    }

    /// Format the unread counts of all rooms
    ///
    /// # Arguments
    ///
    /// * `counts` - Room id to unread count
    ///
    /// # Returns
    ///
    /// One line per room, or a placeholder when nothing is unread
    pub fn format_unread_counts(counts: &UnreadCounts) -> String {
        if counts.is_empty() {
            return "\n(No unread messages)\n".to_string();
        }
        let mut output = String::from("\nUnread:\n");
        for (room_id, count) in counts {
            output.push_str(&format!("  #{}: {}\n", room_id, count));
        }
        output
    }

    /// Format a connection phase change
    pub fn format_phase_change(room_id: i64, phase: ConnectionPhase) -> String {
        format!("\n* #{} is {}\n", room_id, phase)
    }

    /// Format the notice shown after switching rooms
    pub fn format_focus(room_id: i64) -> String {
        format!("\n=== Now viewing #{} ===\n", room_id)
    }

    /// Format the result of a history request
    pub fn format_history_loaded(room_id: i64, count: usize) -> String {
        if count == 0 {
            format!("\nNo older messages in #{}\n", room_id)
        } else {
            format!("\nLoaded {} older messages into #{}\n", count, room_id)
        }
    }

    /// Format the notice for a message that was not sent
    pub fn format_send_dropped(room_id: i64, phase: ConnectionPhase) -> String {
        format!("\n! #{} is {}; message not sent\n", room_id, phase)
    }

    pub fn format_help() -> String {
        "\nCommands:\n  /focus <room>  switch to a room\n  /older         load older messages\n  /unread        show unread counts\n  /quit          exit\n".to_string()
    }
}
