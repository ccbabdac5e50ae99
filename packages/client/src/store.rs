//! Reconciliation store: the client's single source of truth for displayed
//! messages and unread counts.
//!
//! Every mutation notifies all subscribers synchronously, after the state
//! lock has been released, so a listener may read the store freely.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use guildrelay_shared::protocol::GuildMessage;

use crate::unread::{UnreadCounts, UnreadStorage};

/// Messages kept per room; older ones are discarded.
pub const MAX_MESSAGES_PER_ROOM: usize = 200;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct StoreState {
    messages: HashMap<i64, Vec<GuildMessage>>,
    unread: UnreadCounts,
    unread_loaded: bool,
}

struct StoreInner {
    state: Mutex<StoreState>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
    storage: Arc<dyn UnreadStorage>,
    max_messages: usize,
}

/// Shared handle to the store; clones observe the same state.
#[derive(Clone)]
pub struct ReconciliationStore {
    inner: Arc<StoreInner>,
}

/// Keeps a listener registered until dropped.
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade()
            && let Ok(mut listeners) = inner.listeners.lock()
        {
            listeners.remove(&self.id);
        }
    }
}

impl ReconciliationStore {
    pub fn new(storage: Arc<dyn UnreadStorage>) -> Self {
        Self::with_max_messages(storage, MAX_MESSAGES_PER_ROOM)
    }

    pub fn with_max_messages(storage: Arc<dyn UnreadStorage>, max_messages: usize) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: AtomicU64::new(0),
                storage,
                max_messages,
            }),
        }
    }

    /// Register `listener` to run after every mutation
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, Arc::new(listener));
        }
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Replace a room's log with its first history page
    pub fn set_initial_page(&self, room_id: i64, messages: Vec<GuildMessage>) {
        {
            let mut state = self.lock_state();
            let mut log = messages;
            trim_oldest(&mut log, self.inner.max_messages);
            state.messages.insert(room_id, log);
        }
        self.emit();
    }

    /// Put an older history page in front of a room's log.
    ///
    /// Messages already present by id are skipped; messages without an id
    /// are never considered duplicates.
    pub fn prepend_older_page(&self, room_id: i64, older: Vec<GuildMessage>) {
        if older.is_empty() {
            return;
        }
        {
            let mut state = self.lock_state();
            let existing = state.messages.remove(&room_id).unwrap_or_default();
            let known: HashSet<i64> = existing.iter().filter_map(|message| message.id).collect();

            let mut merged: Vec<GuildMessage> = older
                .into_iter()
                .filter(|message| message.id.is_none_or(|id| !known.contains(&id)))
                .collect();
            merged.extend(existing);
            trim_oldest(&mut merged, self.inner.max_messages);
            state.messages.insert(room_id, merged);
        }
        self.emit();
    }

    /// Add a message received in real time to the end of its room's log
    /// Returns false when a message with the same id is already present
    pub fn append_live(&self, message: GuildMessage) -> bool {
        {
            let mut state = self.lock_state();
            let log = state.messages.entry(message.guild_id).or_default();
            if let Some(id) = message.id
                && log.iter().any(|existing| existing.id == Some(id))
            {
                return false;
            }
            log.push(message);
            trim_oldest(log, self.inner.max_messages);
        }
        self.emit();
        true
    }

    pub fn increment_unread(&self, room_id: i64) {
        {
            let mut state = self.lock_state();
            self.ensure_unread_loaded(&mut state);
            *state.unread.entry(room_id).or_insert(0) += 1;
            self.persist_unread(&state.unread);
        }
        self.emit();
    }

    /// Drop a room's unread entry; a room without one is left untouched
    pub fn clear_unread(&self, room_id: i64) {
        {
            let mut state = self.lock_state();
            self.ensure_unread_loaded(&mut state);
            if state.unread.remove(&room_id).is_none() {
                return;
            }
            self.persist_unread(&state.unread);
        }
        self.emit();
    }

    pub fn messages(&self, room_id: i64) -> Vec<GuildMessage> {
        self.lock_state()
            .messages
            .get(&room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Smallest persisted id in a room's log, used as the next history cursor
    pub fn oldest_id(&self, room_id: i64) -> Option<i64> {
        self.lock_state()
            .messages
            .get(&room_id)
            .and_then(|log| log.iter().filter_map(|message| message.id).min())
    }

    pub fn unread_counts(&self) -> UnreadCounts {
        let mut state = self.lock_state();
        self.ensure_unread_loaded(&mut state);
        state.unread.clone()
    }

    pub fn unread(&self, room_id: i64) -> u32 {
        self.unread_counts().get(&room_id).copied().unwrap_or(0)
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        // Listeners run outside this lock
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_unread_loaded(&self, state: &mut StoreState) {
        if state.unread_loaded {
            return;
        }
        state.unread = match self.inner.storage.load() {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!("Discarding stored unread counts: {}", e);
                UnreadCounts::new()
            }
        };
        state.unread_loaded = true;
    }

    fn persist_unread(&self, counts: &UnreadCounts) {
        if let Err(e) = self.inner.storage.save(counts) {
            tracing::warn!("Failed to persist unread counts: {}", e);
        }
    }

    fn emit(&self) {
        let listeners: Vec<Listener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener();
        }
    }
}

fn trim_oldest(log: &mut Vec<GuildMessage>, max: usize) {
    if log.len() > max {
        log.drain(..log.len() - max);
    }
}
