//! Connection lifecycle and the abstract wire contract to the sync service.
//!
//! Only the message contract is specified here; the concrete transport
//! (WebSocket, test harness, ...) lives outside the core. It drains
//! [`SyncSession::take_outgoing`], feeds inbound frames to
//! [`SyncSession::handle_message`], and reports transport-level outcomes
//! through the `on_*` callbacks.

use serde::{Deserialize, Serialize};

use std::time::Duration;

// Use web-time on WASM, std::time otherwise
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

use crate::ops::{ActorId, Change};
use crate::presence::PresenceState;

/// Initial reconnect delay after a transport failure.
pub const BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Upper bound for the reconnect delay.
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Messages sent to the sync service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a document session.
    Join { document: String },
    /// Leave the current document.
    Leave,
    /// Publish a committed change.
    Push { change: Change },
    /// Presence update (cursor position, user info).
    Presence {
        actor: ActorId,
        #[serde(flatten)]
        state: PresenceState,
    },
}

/// Messages received from the sync service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm document join.
    Joined { document: String, peer_count: usize },
    /// A peer joined the document.
    PeerJoined { peer: String },
    /// A peer left the document.
    PeerLeft { peer: String },
    /// A change from another peer.
    Push { from: String, change: Change },
    /// The service accepted our change with the given local sequence.
    Ack { seq: u64 },
    /// Presence update from another peer.
    Presence {
        from: String,
        actor: ActorId,
        #[serde(flatten)]
        state: PresenceState,
    },
    /// Error message.
    Error { message: String },
}

/// Connection state machine.
///
/// `Disconnected -> Connecting -> Connected` normally; `Connected ->
/// Syncing` while a change round is in flight; any state can drop to
/// `Error`, which reconnects through backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Syncing,
    Error,
}

/// Events surfaced to the application from inbound traffic.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    JoinedDocument { document: String, peer_count: usize },
    PeerJoined { peer: String },
    PeerLeft { peer: String },
    ChangeReceived { from: String, change: Change },
    ChangeAcked { seq: u64 },
    PresenceReceived { from: String, actor: ActorId, state: PresenceState },
    Error { message: String },
}

/// Reconnect delay: doubles after every failure, resets on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait before the next attempt; doubles the stored delay.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_MAX)
    }
}

/// Session-side half of the sync contract.
///
/// Owns connection health, the writeable gate and the outgoing queue of
/// JSON frames. Constructed with explicit context (no ambient user role).
#[derive(Debug)]
pub struct SyncSession {
    state: ConnectionState,
    writeable: bool,
    got_update: bool,
    last_update_ok: bool,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
    outgoing: Vec<String>,
    document: Option<String>,
}

impl SyncSession {
    pub fn new(writeable: bool) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            writeable,
            got_update: false,
            last_update_ok: true,
            backoff: Backoff::default(),
            reconnect_at: None,
            outgoing: Vec::new(),
            document: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether local commits are accepted at all. A reader-only session
    /// rejects commits rather than silently dropping them.
    pub fn is_writeable(&self) -> bool {
        self.writeable
    }

    pub fn set_writeable(&mut self, writeable: bool) {
        self.writeable = writeable;
    }

    /// Whether any synchronization round has completed since connecting.
    pub fn got_update(&self) -> bool {
        self.got_update
    }

    /// Outcome of the most recent synchronization round.
    pub fn is_last_update_successful(&self) -> bool {
        self.last_update_ok
    }

    pub fn current_document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    // --- Lifecycle ---

    /// Start connecting. No-op while already connecting or connected.
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            self.state = ConnectionState::Connecting;
            self.reconnect_at = None;
        }
    }

    /// Transport reports the socket is open.
    pub fn on_connected(&mut self) {
        log::info!("sync: connected");
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        self.reconnect_at = None;
        if let Some(document) = self.document.clone() {
            // Re-join after a reconnect.
            self.queue(&ClientMessage::Join { document });
        }
    }

    /// Transport reports an orderly close.
    pub fn on_disconnected(&mut self) {
        log::info!("sync: disconnected");
        self.state = ConnectionState::Disconnected;
    }

    /// Transport reports a failure. Non-fatal: local edits continue to be
    /// accepted and queued; a reconnect is scheduled with backoff.
    pub fn on_transport_error(&mut self, message: &str, now: Instant) {
        log::warn!("sync: transport error: {message}");
        self.state = ConnectionState::Error;
        self.last_update_ok = false;
        self.reconnect_at = Some(now + self.backoff.next_delay());
    }

    /// Whether the backoff delay has elapsed and a reconnect should start.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        matches!(self.state, ConnectionState::Error)
            && self.reconnect_at.is_some_and(|at| now >= at)
    }

    /// Move back to `Connecting` once the backoff delay has elapsed.
    pub fn begin_reconnect(&mut self, now: Instant) -> bool {
        if self.reconnect_due(now) {
            log::info!("sync: reconnecting");
            self.state = ConnectionState::Connecting;
            self.reconnect_at = None;
            true
        } else {
            false
        }
    }

    // --- Outbound ---

    pub fn join(&mut self, document: &str) {
        self.document = Some(document.to_string());
        self.queue(&ClientMessage::Join {
            document: document.to_string(),
        });
    }

    pub fn leave(&mut self) {
        if self.document.take().is_some() {
            self.queue(&ClientMessage::Leave);
        }
    }

    /// Queue a committed change for the service.
    pub fn queue_change(&mut self, change: &Change) {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Syncing;
        }
        self.queue(&ClientMessage::Push {
            change: change.clone(),
        });
    }

    /// Take pending outgoing frames (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("sync: failed to encode message: {e}"),
        }
    }

    // --- Inbound ---

    /// Parse an inbound frame and update connection bookkeeping.
    ///
    /// `ChangeReceived` events must be fed to the document engine; the
    /// engine reports the merge outcome back via
    /// [`SyncSession::finish_sync_round`].
    pub fn handle_message(&mut self, json: &str) -> Option<SyncEvent> {
        let msg: ServerMessage = match serde_json::from_str(json) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("sync: unparseable frame: {e}");
                return None;
            }
        };

        match msg {
            ServerMessage::Joined { document, peer_count } => {
                self.document = Some(document.clone());
                Some(SyncEvent::JoinedDocument { document, peer_count })
            }
            ServerMessage::PeerJoined { peer } => Some(SyncEvent::PeerJoined { peer }),
            ServerMessage::PeerLeft { peer } => Some(SyncEvent::PeerLeft { peer }),
            ServerMessage::Push { from, change } => {
                if self.state == ConnectionState::Connected {
                    self.state = ConnectionState::Syncing;
                }
                Some(SyncEvent::ChangeReceived { from, change })
            }
            ServerMessage::Ack { seq } => {
                self.finish_sync_round(true);
                Some(SyncEvent::ChangeAcked { seq })
            }
            ServerMessage::Error { message } => {
                log::warn!("sync: service error: {message}");
                self.finish_sync_round(false);
                Some(SyncEvent::Error { message })
            }
            ServerMessage::Presence { from, actor, state } => {
                Some(SyncEvent::PresenceReceived { from, actor, state })
            }
        }
    }

    /// Record the outcome of a synchronization round so the UI can render
    /// write-health without polling.
    pub fn finish_sync_round(&mut self, ok: bool) {
        self.got_update = true;
        self.last_update_ok = ok;
        if ok {
            self.backoff.reset();
        }
        if self.state == ConnectionState::Syncing {
            self.state = ConnectionState::Connected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_lifecycle_normal_path() {
        let mut session = SyncSession::new(true);
        assert_eq!(session.state(), ConnectionState::Disconnected);

        session.connect();
        assert_eq!(session.state(), ConnectionState::Connecting);

        session.on_connected();
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_transport_error_schedules_backoff_reconnect() {
        let mut session = SyncSession::new(true);
        session.connect();
        session.on_connected();

        let now = Instant::now();
        session.on_transport_error("boom", now);
        assert_eq!(session.state(), ConnectionState::Error);
        assert!(!session.is_last_update_successful());

        assert!(!session.reconnect_due(now));
        let later = now + BACKOFF_BASE;
        assert!(session.reconnect_due(later));
        assert!(session.begin_reconnect(later));
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_join_queues_message_and_rejoins_after_reconnect() {
        let mut session = SyncSession::new(true);
        session.connect();
        session.on_connected();
        session.join("doc-1");

        let frames = session.take_outgoing();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("join"));
        assert!(frames[0].contains("doc-1"));

        // After a drop and reconnect the session re-joins on its own.
        session.on_transport_error("gone", Instant::now());
        session.on_connected();
        let frames = session.take_outgoing();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("doc-1"));
    }

    #[test]
    fn test_ack_marks_round_successful() {
        let mut session = SyncSession::new(true);
        session.connect();
        session.on_connected();
        assert!(!session.got_update());

        let event = session.handle_message(r#"{"type":"ack","seq":4}"#);
        assert!(matches!(event, Some(SyncEvent::ChangeAcked { seq: 4 })));
        assert!(session.got_update());
        assert!(session.is_last_update_successful());
    }

    #[test]
    fn test_push_moves_to_syncing_until_round_finishes() {
        let mut session = SyncSession::new(true);
        session.connect();
        session.on_connected();

        let json = serde_json::to_string(&ServerMessage::Push {
            from: "peer-a".to_string(),
            change: Change {
                id: crate::ops::ChangeId { seq: 1, actor: 2 },
                action_names: vec![],
                ops: vec![],
                snapshot: None,
            },
        })
        .unwrap();

        let event = session.handle_message(&json);
        assert!(matches!(event, Some(SyncEvent::ChangeReceived { .. })));
        assert_eq!(session.state(), ConnectionState::Syncing);

        session.finish_sync_round(true);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_server_message_tagging() {
        let json = r#"{"type":"joined","document":"d","peer_count":2}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::Joined { document, peer_count } => {
                assert_eq!(document, "d");
                assert_eq!(peer_count, 2);
            }
            _ => panic!("wrong message type"),
        }
    }
}
