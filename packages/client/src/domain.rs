//! Domain logic for per-room client connections.
//!
//! This module contains the pure connection state machine. Every transition
//! returns the effects the connection manager has to carry out, so reconnect
//! timing and cancellation can be tested without sockets or timers.

use std::{fmt, time::Duration};

/// Delay before the first reconnect attempt
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(1_000);
/// Upper bound for any reconnect delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(15_000);
/// The attempt counter stops growing here; reconnects themselves never stop.
pub const MAX_RECONNECT_ATTEMPT: u32 = 10;

/// Exponential reconnect backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_BACKOFF,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for the given attempt: `min(max, base * 2^attempt)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_RECONNECT_ATTEMPT);
        self.base.saturating_mul(1_u32 << exponent).min(self.max)
    }
}

/// Observable state of one room's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Side effect requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start a handshake; its outcome must be reported with `generation`
    Connect { generation: u64 },
    /// Drop the current transport, if any
    Disconnect,
    /// Call `reconnect_due(timer)` after `delay`
    ScheduleReconnect { timer: u64, delay: Duration },
    /// Abort the pending reconnect timer
    CancelReconnect,
}

/// Connection state for a single room.
///
/// `generation` tags each handshake so that events from a socket that was
/// already replaced are ignored. At most one reconnect timer is pending.
#[derive(Debug)]
pub struct RoomConnection {
    policy: BackoffPolicy,
    phase: ConnectionPhase,
    subscribers: usize,
    has_credential: bool,
    attempt: u32,
    generation: u64,
    next_timer: u64,
    pending_timer: Option<u64>,
}

impl RoomConnection {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            phase: ConnectionPhase::Idle,
            subscribers: 0,
            has_credential: false,
            attempt: 0,
            generation: 0,
            next_timer: 0,
            pending_timer: None,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether `generation` tags the most recent handshake
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.pending_timer.is_some()
    }

    /// A new consumer is interested in the room
    pub fn retain(&mut self) -> Vec<Effect> {
        self.subscribers += 1;
        self.ensure_connected()
    }

    /// A consumer went away; the last one tears the connection down
    pub fn release(&mut self) -> Vec<Effect> {
        self.subscribers = self.subscribers.saturating_sub(1);
        if self.subscribers == 0 {
            self.shut_down()
        } else {
            Vec::new()
        }
    }

    /// The credential was replaced (`true`) or cleared (`false`).
    ///
    /// A replaced credential invalidates the current socket, which was
    /// authenticated with the old token.
    pub fn credential_changed(&mut self, available: bool) -> Vec<Effect> {
        if !available {
            self.has_credential = false;
            return self.shut_down();
        }

        let mut effects = Vec::new();
        if self.is_live() {
            effects.push(Effect::Disconnect);
            self.phase = ConnectionPhase::Idle;
        }
        self.has_credential = true;
        self.attempt = 0;
        effects.extend(self.ensure_connected());
        effects
    }

    /// The handshake tagged `generation` completed
    pub fn opened(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.phase != ConnectionPhase::Connecting {
            return Vec::new();
        }
        self.phase = ConnectionPhase::Open;
        self.attempt = 0;
        self.cancel_reconnect()
    }

    /// The transport tagged `generation` closed (`failed == false`) or failed
    pub fn transport_ended(&mut self, generation: u64, failed: bool) -> Vec<Effect> {
        if generation != self.generation || !self.is_live() {
            return Vec::new();
        }
        self.phase = if failed {
            ConnectionPhase::Error
        } else {
            ConnectionPhase::Closed
        };

        let mut effects = vec![Effect::Disconnect];
        if self.subscribers > 0 && self.has_credential {
            effects.extend(self.schedule_reconnect());
        }
        effects
    }

    /// The reconnect timer `timer` fired
    pub fn reconnect_due(&mut self, timer: u64) -> Vec<Effect> {
        if self.pending_timer != Some(timer) {
            return Vec::new();
        }
        self.pending_timer = None;
        self.ensure_connected()
    }

    fn is_live(&self) -> bool {
        matches!(
            self.phase,
            ConnectionPhase::Connecting | ConnectionPhase::Open
        )
    }

    fn ensure_connected(&mut self) -> Vec<Effect> {
        if !self.has_credential || self.subscribers == 0 || self.is_live() {
            return Vec::new();
        }
        let mut effects = self.cancel_reconnect();
        self.generation += 1;
        self.phase = ConnectionPhase::Connecting;
        effects.push(Effect::Connect {
            generation: self.generation,
        });
        effects
    }

    fn schedule_reconnect(&mut self) -> Vec<Effect> {
        if self.pending_timer.is_some() {
            return Vec::new();
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt = (self.attempt + 1).min(MAX_RECONNECT_ATTEMPT);
        self.next_timer += 1;
        self.pending_timer = Some(self.next_timer);
        vec![Effect::ScheduleReconnect {
            timer: self.next_timer,
            delay,
        }]
    }

    fn cancel_reconnect(&mut self) -> Vec<Effect> {
        match self.pending_timer.take() {
            Some(_) => vec![Effect::CancelReconnect],
            None => Vec::new(),
        }
    }

    fn shut_down(&mut self) -> Vec<Effect> {
        let mut effects = self.cancel_reconnect();
        if self.is_live() {
            effects.push(Effect::Disconnect);
        }
        self.phase = ConnectionPhase::Idle;
        self.attempt = 0;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_room() -> RoomConnection {
        let mut room = RoomConnection::new(BackoffPolicy::default());
        room.retain();
        room.credential_changed(true);
        room
    }

    /// Fail the current handshake and return the scheduled delay
    fn fail_and_take_delay(room: &mut RoomConnection, generation: u64) -> (u64, Duration) {
        let effects = room.transport_ended(generation, true);
        match effects.as_slice() {
            [Effect::Disconnect, Effect::ScheduleReconnect { timer, delay }] => (*timer, *delay),
            other => panic!("unexpected effects: {other:?}"),
        }
    }

    #[test]
    fn test_backoff_delays_double_until_capped() {
        // テスト項目: 1000ms 基準・15000ms 上限で 1000, 2000, 4000, 8000, 15000, 15000 となる
        // given (前提条件):
        let policy = BackoffPolicy::new(Duration::from_millis(1000), Duration::from_millis(15000));

        // when (操作):
        let delays: Vec<u128> = (0..6).map(|attempt| policy.delay(attempt).as_millis()).collect();

        // then (期待する結果):
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 15000, 15000]);
    }

    #[test]
    fn test_backoff_delay_does_not_overflow_for_large_attempts() {
        // テスト項目: 非常に大きな試行回数でも上限値が返る
        // given (前提条件):
        let policy = BackoffPolicy::default();

        // when (操作):
        let delay = policy.delay(u32::MAX);

        // then (期待する結果):
        assert_eq!(delay, DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn test_retain_without_credential_stays_idle() {
        // テスト項目: クレデンシャルがなければ購読しても接続しない
        // given (前提条件):
        let mut room = RoomConnection::new(BackoffPolicy::default());

        // when (操作):
        let effects = room.retain();

        // then (期待する結果):
        assert!(effects.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_credential_then_open() {
        // テスト項目: idle → connecting → open と遷移し、試行回数が 0 に戻る
        // given (前提条件):
        let mut room = RoomConnection::new(BackoffPolicy::default());
        room.retain();

        // when (操作):
        let connect = room.credential_changed(true);
        let opened = room.opened(1);

        // then (期待する結果):
        assert_eq!(connect, vec![Effect::Connect { generation: 1 }]);
        assert!(opened.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Open);
        assert_eq!(room.attempt(), 0);
    }

    #[test]
    fn test_second_subscriber_reuses_connection() {
        // テスト項目: 二人目の購読者は新しい接続を開始しない
        // given (前提条件):
        let mut room = connected_room();
        room.opened(1);

        // when (操作):
        let effects = room.retain();

        // then (期待する結果):
        assert!(effects.is_empty());
        assert_eq!(room.subscribers(), 2);
        assert_eq!(room.phase(), ConnectionPhase::Open);
    }

    #[test]
    fn test_repeated_failures_follow_backoff_schedule() {
        // テスト項目: 失敗が続くと遅延が指数的に伸び、上限で頭打ちになる
        // given (前提条件):
        let mut room = connected_room();
        let mut generation = 1;
        let mut delays = Vec::new();

        // when (操作):
        for _ in 0..6 {
            let (timer, delay) = fail_and_take_delay(&mut room, generation);
            delays.push(delay.as_millis());
            let effects = room.reconnect_due(timer);
            generation += 1;
            assert_eq!(effects, vec![Effect::Connect { generation }]);
        }

        // then (期待する結果):
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 15000, 15000]);
    }

    #[test]
    fn test_successful_open_resets_backoff() {
        // テスト項目: 接続に成功すると次の切断時の遅延は基準値に戻る
        // given (前提条件):
        let mut room = connected_room();
        let (timer, _) = fail_and_take_delay(&mut room, 1);
        room.reconnect_due(timer);
        let (timer, _) = fail_and_take_delay(&mut room, 2);
        room.reconnect_due(timer);
        room.opened(3);

        // when (操作):
        let effects = room.transport_ended(3, false);

        // then (期待する結果):
        assert_eq!(room.phase(), ConnectionPhase::Closed);
        assert_eq!(
            effects,
            vec![
                Effect::Disconnect,
                Effect::ScheduleReconnect {
                    timer: 3,
                    delay: Duration::from_millis(1000),
                },
            ]
        );
    }

    #[test]
    fn test_healthy_connection_cancels_pending_reconnect() {
        // テスト項目: 接続が健全になると予約済みの再接続は発火しない
        // given (前提条件):
        let mut room = connected_room();
        let (timer, _) = fail_and_take_delay(&mut room, 1);

        // when (操作):
        let relogin = room.credential_changed(true);
        room.opened(2);
        let fired = room.reconnect_due(timer);

        // then (期待する結果):
        assert_eq!(
            relogin,
            vec![Effect::CancelReconnect, Effect::Connect { generation: 2 }]
        );
        assert!(fired.is_empty());
        assert!(!room.has_pending_reconnect());
        assert_eq!(room.phase(), ConnectionPhase::Open);
    }

    #[test]
    fn test_only_one_reconnect_pending() {
        // テスト項目: close と error が続いても再接続は一つしか予約されない
        // given (前提条件):
        let mut room = connected_room();
        room.opened(1);
        fail_and_take_delay(&mut room, 1);

        // when (操作):
        let effects = room.transport_ended(1, false);

        // then (期待する結果):
        assert!(effects.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Error);
    }

    #[test]
    fn test_last_release_goes_idle_without_reconnect() {
        // テスト項目: 購読者が 0 になると切断され、その後の close で再接続しない
        // given (前提条件):
        let mut room = connected_room();
        room.opened(1);

        // when (操作):
        let released = room.release();
        let ended = room.transport_ended(1, false);

        // then (期待する結果):
        assert_eq!(released, vec![Effect::Disconnect]);
        assert!(ended.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_release_cancels_pending_reconnect() {
        // テスト項目: 再接続待ちの部屋を解放するとタイマーが取り消される
        // given (前提条件):
        let mut room = connected_room();
        let (timer, _) = fail_and_take_delay(&mut room, 1);

        // when (操作):
        let released = room.release();
        let fired = room.reconnect_due(timer);

        // then (期待する結果):
        assert_eq!(released, vec![Effect::CancelReconnect]);
        assert!(fired.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_logout_closes_and_stays_idle() {
        // テスト項目: クレデンシャルが消えると切断し、再接続しない
        // given (前提条件):
        let mut room = connected_room();
        room.opened(1);

        // when (操作):
        let logout = room.credential_changed(false);
        let ended = room.transport_ended(1, true);

        // then (期待する結果):
        assert_eq!(logout, vec![Effect::Disconnect]);
        assert!(ended.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_events_from_replaced_socket_are_ignored() {
        // テスト項目: 置き換え済みの接続からのイベントは無視される
        // given (前提条件):
        let mut room = connected_room();
        room.opened(1);
        room.credential_changed(true);

        // when (操作):
        let stale_open = room.opened(1);
        let stale_close = room.transport_ended(1, false);

        // then (期待する結果):
        assert!(stale_open.is_empty());
        assert!(stale_close.is_empty());
        assert_eq!(room.phase(), ConnectionPhase::Connecting);
    }
}
