//! Interactive terminal session.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::{
    config::ClientConfig,
    domain::ConnectionPhase,
    error::ClientError,
    formatter::MessageFormatter,
    history::HistoryClient,
    manager::{ConnectionManager, RoomLease, RoomPhases},
    store::ReconciliationStore,
    transport::WebSocketConnector,
    ui::{InputCommand, RenderCursor, parse_input, prompt, redisplay_prompt},
    unread::{FileUnreadStorage, MemoryUnreadStorage, UnreadStorage},
};

/// Run the client until the user quits
pub async fn run_client_session(config: ClientConfig) -> Result<(), ClientError> {
    let Some(&first_room) = config.rooms.first() else {
        return Ok(());
    };
    let unread_file = config
        .unread_file
        .as_ref()
        .map(|path| Arc::new(FileUnreadStorage::new(path)));
    let storage: Arc<dyn UnreadStorage> = match &unread_file {
        Some(file) => file.clone(),
        None => Arc::new(MemoryUnreadStorage::new()),
    };
    let store = ReconciliationStore::new(storage);
    let history = HistoryClient::new(config.url.clone())?;
    let manager = ConnectionManager::spawn(
        Arc::new(WebSocketConnector::new(config.url.clone())),
        store.clone(),
        config.backoff_policy(),
    );

    let mut leases: HashMap<i64, RoomLease> = HashMap::new();
    for &room_id in &config.rooms {
        leases.insert(room_id, manager.retain(room_id));
        load_initial(&history, &store, room_id, &config.token).await;
    }
    manager.set_credential(Some(config.token.clone()))?;
    manager.set_active_room(Some(first_room)).await?;

    let focused = Arc::new(AtomicI64::new(first_room));
    let mut cursor = RenderCursor::new();
    println!(
        "\nType messages and press Enter to send. /help lists commands. Press Ctrl+C to exit.\n"
    );
    print!("{}", MessageFormatter::format_focus(first_room));
    render_new(&store, &mut cursor, first_room);

    let (changed_tx, mut changed_rx) = mpsc::unbounded_channel::<()>();
    let _subscription = store.subscribe(move || {
        changed_tx.send(()).ok();
    });
    let mut phases = manager.watch_phases();
    let mut shown_phases = RoomPhases::new();

    let mut input_rx = spawn_readline(focused.clone());

    loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                let room_id = focused.load(Ordering::SeqCst);
                match parse_input(&line) {
                    InputCommand::Say(body) => {
                        let phase = manager.phase(room_id);
                        if phase == ConnectionPhase::Open {
                            manager.send(room_id, body)?;
                        } else {
                            print!("{}", MessageFormatter::format_send_dropped(room_id, phase));
                        }
                    }
                    InputCommand::Focus(next) => {
                        if !leases.contains_key(&next) {
                            leases.insert(next, manager.retain(next));
                            load_initial(&history, &store, next, &config.token).await;
                        }
                        focused.store(next, Ordering::SeqCst);
                        manager.set_active_room(Some(next)).await?;
                        print!("{}", MessageFormatter::format_focus(next));
                        render_new(&store, &mut cursor, next);
                    }
                    InputCommand::Older => {
                        match history.load_older_page(&store, room_id, &config.token).await {
                            Ok(count) => print!("{}", MessageFormatter::format_history_loaded(room_id, count)),
                            Err(e) => tracing::warn!("Failed to load older messages of room {}: {}", room_id, e),
                        }
                    }
                    InputCommand::Unread => {
                        print!("{}", MessageFormatter::format_unread_counts(&store.unread_counts()));
                    }
                    InputCommand::Help => print!("{}", MessageFormatter::format_help()),
                    InputCommand::Quit => break,
                    InputCommand::Invalid(reason) => {
                        println!("\n{}", reason);
                        print!("{}", MessageFormatter::format_help());
                    }
                }
            }
            Some(()) = changed_rx.recv() => {
                let room_id = focused.load(Ordering::SeqCst);
                if render_new(&store, &mut cursor, room_id) {
                    redisplay_prompt(room_id);
                }
            }
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = phases.borrow_and_update().clone();
                for (room_id, phase) in &current {
                    if shown_phases.get(room_id) != Some(phase) {
                        print!("{}", MessageFormatter::format_phase_change(*room_id, *phase));
                    }
                }
                shown_phases = current;
                redisplay_prompt(focused.load(Ordering::SeqCst));
            }
        }
    }

    if let Some(file) = &unread_file {
        file.flush().await;
    }
    tracing::info!("Client session ended");
    Ok(())
}

async fn load_initial(history: &HistoryClient, store: &ReconciliationStore, room_id: i64, token: &str) {
    if let Err(e) = history.load_initial_page(store, room_id, token).await {
        tracing::warn!("Failed to load history of room {}: {}", room_id, e);
    }
}

/// Print messages of `room_id` not printed yet; returns whether anything was printed
fn render_new(store: &ReconciliationStore, cursor: &mut RenderCursor, room_id: i64) -> bool {
    let messages = store.messages(room_id);
    let unseen = cursor.unseen(room_id, &messages);
    for message in &unseen {
        print!("{}", MessageFormatter::format_guild_message(message));
    }
    !unseen.is_empty()
}

/// Read lines on a blocking thread; the channel closes on Ctrl+C or Ctrl+D
fn spawn_readline(focused: Arc<AtomicI64>) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt(focused.load(Ordering::SeqCst))) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}
