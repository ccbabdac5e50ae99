//! Client connection manager.
//!
//! A single task owns the table of room connections and processes every
//! driving event in order: retain/release, credential changes, transport
//! events and reconnect timers. The per-room state machine in
//! [`crate::domain`] decides what happens; this module carries out its
//! effects.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use guildrelay_shared::protocol::{ClientFrame, ServerFrame};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    domain::{BackoffPolicy, ConnectionPhase, Effect, RoomConnection},
    error::ClientError,
    store::ReconciliationStore,
    transport::{Connector, TransportEvent, TransportLink},
};

/// Room id → current phase
pub type RoomPhases = BTreeMap<i64, ConnectionPhase>;

enum ManagerInput {
    Retain(i64),
    Release(i64),
    SetCredential(Option<String>),
    SetActiveRoom(Option<i64>, oneshot::Sender<()>),
    Send {
        room_id: i64,
        body: String,
    },
    Connected {
        room_id: i64,
        generation: u64,
        result: Result<TransportLink, ClientError>,
    },
    Transport {
        room_id: i64,
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue {
        room_id: i64,
        timer: u64,
    },
}

/// Handle to the connection manager task.
#[derive(Clone)]
pub struct ConnectionManager {
    tx: mpsc::UnboundedSender<ManagerInput>,
    phases: watch::Receiver<RoomPhases>,
}

/// Interest in a room; the room is released when the lease is dropped.
pub struct RoomLease {
    room_id: i64,
    tx: mpsc::UnboundedSender<ManagerInput>,
}

impl RoomLease {
    pub fn room_id(&self) -> i64 {
        self.room_id
    }
}

impl Drop for RoomLease {
    fn drop(&mut self) {
        self.tx.send(ManagerInput::Release(self.room_id)).ok();
    }
}

impl ConnectionManager {
    /// Start the manager task.
    ///
    /// The task stops once every handle and lease has been dropped.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        store: ReconciliationStore,
        policy: BackoffPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (phases_tx, phases_rx) = watch::channel(RoomPhases::new());

        let manager_loop = ManagerLoop {
            connector,
            store,
            policy,
            token: None,
            active_room: None,
            rooms: HashMap::new(),
            inbox: tx.downgrade(),
            phases: phases_tx,
        };
        tokio::spawn(manager_loop.run(rx));

        Self {
            tx,
            phases: phases_rx,
        }
    }

    /// Keep a connection to `room_id` alive for as long as the lease lives
    pub fn retain(&self, room_id: i64) -> RoomLease {
        if self.tx.send(ManagerInput::Retain(room_id)).is_err() {
            tracing::warn!("Connection manager has shut down; room {} not retained", room_id);
        }
        RoomLease {
            room_id,
            tx: self.tx.clone(),
        }
    }

    /// Replace the credential, or clear it with `None` (logout)
    pub fn set_credential(&self, token: Option<String>) -> Result<(), ClientError> {
        let token = token.filter(|token| !token.is_empty());
        self.tx
            .send(ManagerInput::SetCredential(token))
            .map_err(|_| ClientError::ManagerClosed)
    }

    /// Focus a room; its unread count is cleared before this returns
    pub async fn set_active_room(&self, room_id: Option<i64>) -> Result<(), ClientError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(ManagerInput::SetActiveRoom(room_id, ack_tx))
            .map_err(|_| ClientError::ManagerClosed)?;
        ack_rx.await.map_err(|_| ClientError::ManagerClosed)
    }

    /// Send a chat message to a room.
    ///
    /// The message is dropped unless the room's connection is open.
    pub fn send(&self, room_id: i64, body: impl Into<String>) -> Result<(), ClientError> {
        self.tx
            .send(ManagerInput::Send {
                room_id,
                body: body.into(),
            })
            .map_err(|_| ClientError::ManagerClosed)
    }

    pub fn phase(&self, room_id: i64) -> ConnectionPhase {
        self.phases
            .borrow()
            .get(&room_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn watch_phases(&self) -> watch::Receiver<RoomPhases> {
        self.phases.clone()
    }

    /// Wait until `room_id` reaches `phase`
    pub async fn wait_for_phase(
        &self,
        room_id: i64,
        phase: ConnectionPhase,
    ) -> Result<(), ClientError> {
        let mut phases = self.phases.clone();
        let reached = phases
            .wait_for(|phases| phases.get(&room_id).copied().unwrap_or_default() == phase)
            .await
            .is_ok();
        if reached {
            Ok(())
        } else {
            Err(ClientError::ManagerClosed)
        }
    }
}

/// Per-room bookkeeping next to the state machine
struct RoomSlot {
    connection: RoomConnection,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl RoomSlot {
    fn new(policy: BackoffPolicy) -> Self {
        Self {
            connection: RoomConnection::new(policy),
            outbound: None,
            reader: None,
            timer: None,
        }
    }

    fn abort_tasks(&mut self) {
        self.outbound = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct ManagerLoop {
    connector: Arc<dyn Connector>,
    store: ReconciliationStore,
    policy: BackoffPolicy,
    token: Option<String>,
    active_room: Option<i64>,
    rooms: HashMap<i64, RoomSlot>,
    /// Weak so that helper tasks do not keep the loop alive
    inbox: mpsc::WeakUnboundedSender<ManagerInput>,
    phases: watch::Sender<RoomPhases>,
}

impl ManagerLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ManagerInput>) {
        while let Some(input) = rx.recv().await {
            self.dispatch(input);
        }

        for slot in self.rooms.values_mut() {
            slot.abort_tasks();
        }
        tracing::debug!("Connection manager stopped");
    }

    fn dispatch(&mut self, input: ManagerInput) {
        match input {
            ManagerInput::Retain(room_id) => self.retain(room_id),
            ManagerInput::Release(room_id) => self.release(room_id),
            ManagerInput::SetCredential(token) => self.set_credential(token),
            ManagerInput::SetActiveRoom(room_id, ack) => {
                self.active_room = room_id;
                if let Some(room_id) = room_id {
                    self.store.clear_unread(room_id);
                }
                ack.send(()).ok();
            }
            ManagerInput::Send { room_id, body } => self.send(room_id, body),
            ManagerInput::Connected {
                room_id,
                generation,
                result,
            } => self.connected(room_id, generation, result),
            ManagerInput::Transport {
                room_id,
                generation,
                event,
            } => self.transport_event(room_id, generation, event),
            ManagerInput::ReconnectDue { room_id, timer } => {
                let Some(slot) = self.rooms.get_mut(&room_id) else {
                    return;
                };
                slot.timer = None;
                let effects = slot.connection.reconnect_due(timer);
                self.apply(room_id, effects);
            }
        }
    }

    fn retain(&mut self, room_id: i64) {
        let has_credential = self.token.is_some();
        let policy = self.policy;
        let slot = self.rooms.entry(room_id).or_insert_with(|| {
            let mut slot = RoomSlot::new(policy);
            if has_credential {
                slot.connection.credential_changed(true);
            }
            slot
        });
        let effects = slot.connection.retain();
        self.apply(room_id, effects);
    }

    fn release(&mut self, room_id: i64) {
        let Some(slot) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let effects = slot.connection.release();
        let unused = slot.connection.subscribers() == 0;
        self.apply(room_id, effects);

        if unused && let Some(mut slot) = self.rooms.remove(&room_id) {
            slot.abort_tasks();
            tracing::info!("Released room {}", room_id);
            self.publish(room_id);
        }
    }

    fn set_credential(&mut self, token: Option<String>) {
        if token == self.token {
            return;
        }
        let available = token.is_some();
        self.token = token;

        let room_ids: Vec<i64> = self.rooms.keys().copied().collect();
        for room_id in room_ids {
            if let Some(slot) = self.rooms.get_mut(&room_id) {
                let effects = slot.connection.credential_changed(available);
                self.apply(room_id, effects);
            }
        }
    }

    fn send(&mut self, room_id: i64, body: String) {
        let Some(slot) = self.rooms.get(&room_id) else {
            tracing::debug!("Dropping message for unretained room {}", room_id);
            return;
        };
        let phase = slot.connection.phase();
        let Some(outbound) = slot.outbound.as_ref().filter(|_| phase == ConnectionPhase::Open)
        else {
            tracing::debug!("Dropping message for room {}: connection is {}", room_id, phase);
            return;
        };

        match serde_json::to_string(&ClientFrame::message(room_id, body)) {
            Ok(json) => {
                outbound.send(json).ok();
            }
            Err(e) => tracing::warn!("Failed to encode message for room {}: {}", room_id, e),
        }
    }

    fn connected(
        &mut self,
        room_id: i64,
        generation: u64,
        result: Result<TransportLink, ClientError>,
    ) {
        let Some(slot) = self.rooms.get_mut(&room_id) else {
            return;
        };
        if !slot.connection.is_current(generation) {
            return;
        }

        let effects = match result {
            Ok(link) => {
                let effects = slot.connection.opened(generation);
                if slot.connection.phase() == ConnectionPhase::Open {
                    tracing::info!("Connected to room {}", room_id);
                    slot.outbound = Some(link.outbound);
                    slot.reader = Some(spawn_reader(
                        self.inbox.clone(),
                        room_id,
                        generation,
                        link.inbound,
                    ));
                }
                effects
            }
            Err(e) => {
                tracing::warn!("Connection to room {} failed: {}", room_id, e);
                slot.connection.transport_ended(generation, true)
            }
        };
        self.apply(room_id, effects);
    }

    fn transport_event(&mut self, room_id: i64, generation: u64, event: TransportEvent) {
        let Some(slot) = self.rooms.get_mut(&room_id) else {
            return;
        };
        if !slot.connection.is_current(generation) {
            return;
        }

        let effects = match event {
            TransportEvent::Text(text) => {
                self.handle_text(room_id, &text);
                return;
            }
            TransportEvent::Closed => {
                tracing::info!("Room {} connection closed", room_id);
                slot.connection.transport_ended(generation, false)
            }
            TransportEvent::Failed(reason) => {
                tracing::warn!("Room {} connection failed: {}", room_id, reason);
                slot.connection.transport_ended(generation, true)
            }
        };
        self.apply(room_id, effects);
    }

    /// Frames for another room than the socket's are dropped; a re-delivered
    /// message leaves the unread count alone.
    fn handle_text(&self, room_id: i64, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::GuildMessage(message)) => {
                if message.guild_id != room_id {
                    tracing::warn!(
                        "Dropping message for room {} received on room {}",
                        message.guild_id,
                        room_id
                    );
                    return;
                }
                if !self.store.append_live(message) {
                    return;
                }
                if self.active_room == Some(room_id) {
                    self.store.clear_unread(room_id);
                } else {
                    self.store.increment_unread(room_id);
                }
            }
            Ok(ServerFrame::Unknown) => tracing::debug!("Ignoring frame of unknown type"),
            Err(e) => tracing::debug!("Ignoring malformed frame: {}", e),
        }
    }

    fn apply(&mut self, room_id: i64, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connect { generation } => {
                    let Some(token) = self.token.clone() else {
                        continue;
                    };
                    tracing::info!("Connecting to room {}", room_id);
                    let connector = self.connector.clone();
                    let inbox = self.inbox.clone();
                    tokio::spawn(async move {
                        let result = connector.connect(room_id, &token).await;
                        if let Some(tx) = inbox.upgrade() {
                            tx.send(ManagerInput::Connected {
                                room_id,
                                generation,
                                result,
                            })
                            .ok();
                        }
                    });
                }
                Effect::Disconnect => {
                    if let Some(slot) = self.rooms.get_mut(&room_id) {
                        slot.outbound = None;
                        if let Some(reader) = slot.reader.take() {
                            reader.abort();
                        }
                    }
                }
                Effect::ScheduleReconnect { timer, delay } => {
                    tracing::info!(
                        "Reconnecting to room {} in {} ms",
                        room_id,
                        delay.as_millis()
                    );
                    let inbox = self.inbox.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(tx) = inbox.upgrade() {
                            tx.send(ManagerInput::ReconnectDue { room_id, timer }).ok();
                        }
                    });
                    if let Some(slot) = self.rooms.get_mut(&room_id) {
                        slot.timer = Some(handle);
                    }
                }
                Effect::CancelReconnect => {
                    if let Some(timer) = self
                        .rooms
                        .get_mut(&room_id)
                        .and_then(|slot| slot.timer.take())
                    {
                        timer.abort();
                    }
                }
            }
        }
        self.publish(room_id);
    }

    fn publish(&self, room_id: i64) {
        let phase = self
            .rooms
            .get(&room_id)
            .map(|slot| slot.connection.phase())
            .unwrap_or_default();
        self.phases
            .send_if_modified(|phases| phases.insert(room_id, phase) != Some(phase));
    }
}

/// Forward transport events to the manager, tagged with their handshake
fn spawn_reader(
    inbox: mpsc::WeakUnboundedSender<ManagerInput>,
    room_id: i64,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = inbound.recv().await {
            let ended = !matches!(event, TransportEvent::Text(_));
            let Some(tx) = inbox.upgrade() else {
                return;
            };
            tx.send(ManagerInput::Transport {
                room_id,
                generation,
                event,
            })
            .ok();
            if ended {
                return;
            }
        }

        // The transport went away without saying why
        if let Some(tx) = inbox.upgrade() {
            tx.send(ManagerInput::Transport {
                room_id,
                generation,
                event: TransportEvent::Closed,
            })
            .ok();
        }
    })
}
