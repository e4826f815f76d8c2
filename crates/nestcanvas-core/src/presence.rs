//! Ephemeral collaborator presence: cursor broadcast and roster.
//!
//! Out-of-band and non-persisted. No ordering or delivery guarantee is
//! assumed; presence is advisory UI only and must never be used to derive
//! document state.

use std::collections::HashMap;
use std::time::Duration;

use kurbo::Point;
use serde::{Deserialize, Serialize};

// Use web-time on WASM, std::time otherwise
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

use crate::ops::ActorId;
use crate::sync::{ClientMessage, SyncEvent};

/// Minimum interval between cursor broadcasts.
pub const PRESENCE_THROTTLE: Duration = Duration::from_millis(50);

/// Number of distinct collaborator colors before indices wrap.
pub const COLLABORATOR_COLOR_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub color_index: usize,
}

/// Presence state one peer publishes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresenceState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// A live collaborator in the session roster.
///
/// Session-scoped: created on peer join, destroyed on peer leave, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Collaborator {
    /// Transport-level peer key.
    pub id: String,
    pub actor: Option<ActorId>,
    pub name: String,
    /// Stable color index assigned by join order, wrapping at
    /// [`COLLABORATOR_COLOR_COUNT`].
    pub color_index: usize,
    /// Last-known pointer position in document coordinates.
    pub cursor: Option<Point>,
}

/// Roster and broadcast events.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// The set of collaborators changed.
    RosterChanged,
    /// A collaborator's cursor moved.
    PositionChanged { peer: String },
}

/// Throttled cursor broadcast plus the collaborator roster.
#[derive(Debug)]
pub struct PresenceChannel {
    local_actor: ActorId,
    local: PresenceState,
    roster: HashMap<String, Collaborator>,
    joined: usize,
    last_publish: Option<Instant>,
    outgoing: Vec<String>,
}

impl PresenceChannel {
    /// Create a channel for the local user. Identity is explicit context,
    /// not ambient state.
    pub fn new(actor: ActorId, display_name: impl Into<String>) -> Self {
        let local = PresenceState {
            cursor: None,
            user: Some(UserInfo {
                name: display_name.into(),
                color_index: (actor as usize) % COLLABORATOR_COLOR_COUNT,
            }),
        };
        Self {
            local_actor: actor,
            local,
            roster: HashMap::new(),
            joined: 0,
            last_publish: None,
            outgoing: Vec::new(),
        }
    }

    pub fn local_state(&self) -> &PresenceState {
        &self.local
    }

    pub fn roster(&self) -> impl Iterator<Item = &Collaborator> {
        self.roster.values()
    }

    pub fn collaborator(&self, peer: &str) -> Option<&Collaborator> {
        self.roster.get(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.roster.len()
    }

    // --- Outbound ---

    /// Publish the local cursor position, throttled by
    /// [`PRESENCE_THROTTLE`]. Returns whether a broadcast was queued; the
    /// local state is updated either way so the next broadcast carries it.
    pub fn publish_cursor(&mut self, position: Point, now: Instant) -> bool {
        self.local.cursor = Some(CursorPosition {
            x: position.x,
            y: position.y,
        });
        let due = self
            .last_publish
            .is_none_or(|last| now.duration_since(last) >= PRESENCE_THROTTLE);
        if due {
            self.last_publish = Some(now);
            self.queue_state();
        }
        due
    }

    /// Clear the local cursor (pointer left the canvas). Not throttled:
    /// a stale cursor is worse than an extra frame.
    pub fn clear_cursor(&mut self, now: Instant) {
        self.local.cursor = None;
        self.last_publish = Some(now);
        self.queue_state();
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        let color_index = self
            .local
            .user
            .as_ref()
            .map(|u| u.color_index)
            .unwrap_or((self.local_actor as usize) % COLLABORATOR_COLOR_COUNT);
        self.local.user = Some(UserInfo {
            name: name.into(),
            color_index,
        });
        self.queue_state();
    }

    /// Take pending outgoing frames (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue_state(&mut self) {
        let msg = ClientMessage::Presence {
            actor: self.local_actor,
            state: self.local.clone(),
        };
        match serde_json::to_string(&msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("presence: failed to encode state: {e}"),
        }
    }

    // --- Inbound ---

    /// Fold a sync event into the roster.
    pub fn handle_event(&mut self, event: &SyncEvent) -> Option<PresenceEvent> {
        match event {
            SyncEvent::PeerJoined { peer } => {
                self.insert_peer(peer.clone());
                Some(PresenceEvent::RosterChanged)
            }
            SyncEvent::PeerLeft { peer } => self
                .roster
                .remove(peer)
                .map(|_| PresenceEvent::RosterChanged),
            SyncEvent::PresenceReceived { from, actor, state } => {
                let newly_joined = !self.roster.contains_key(from);
                if newly_joined {
                    self.insert_peer(from.clone());
                }
                let entry = self.roster.get_mut(from)?;
                entry.actor = Some(*actor);
                if let Some(user) = &state.user {
                    entry.name = user.name.clone();
                }
                entry.cursor = state.cursor.map(|c| Point::new(c.x, c.y));
                if newly_joined {
                    Some(PresenceEvent::RosterChanged)
                } else {
                    Some(PresenceEvent::PositionChanged { peer: from.clone() })
                }
            }
            SyncEvent::Disconnected => {
                // Roster is session-scoped; a dropped session empties it.
                if self.roster.is_empty() {
                    None
                } else {
                    self.roster.clear();
                    Some(PresenceEvent::RosterChanged)
                }
            }
            _ => None,
        }
    }

    fn insert_peer(&mut self, peer: String) {
        let color_index = self.joined % COLLABORATOR_COLOR_COUNT;
        self.joined += 1;
        self.roster.insert(
            peer.clone(),
            Collaborator {
                id: peer,
                actor: None,
                name: String::new(),
                color_index,
                cursor: None,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_is_throttled() {
        let mut channel = PresenceChannel::new(1, "ada");
        let t0 = Instant::now();

        assert!(channel.publish_cursor(Point::new(1.0, 1.0), t0));
        // Immediately after: suppressed, state still updated.
        assert!(!channel.publish_cursor(Point::new(2.0, 2.0), t0));
        assert_eq!(
            channel.local_state().cursor,
            Some(CursorPosition { x: 2.0, y: 2.0 })
        );

        // After the throttle window the next move goes out.
        assert!(channel.publish_cursor(Point::new(3.0, 3.0), t0 + PRESENCE_THROTTLE));
        assert_eq!(channel.take_outgoing().len(), 2);
    }

    #[test]
    fn test_clear_cursor_bypasses_throttle() {
        let mut channel = PresenceChannel::new(1, "ada");
        let t0 = Instant::now();
        channel.publish_cursor(Point::new(1.0, 1.0), t0);
        channel.clear_cursor(t0);

        assert_eq!(channel.local_state().cursor, None);
        assert_eq!(channel.take_outgoing().len(), 2);
    }

    #[test]
    fn test_roster_join_and_leave() {
        let mut channel = PresenceChannel::new(1, "ada");

        let event = channel.handle_event(&SyncEvent::PeerJoined {
            peer: "p1".to_string(),
        });
        assert_eq!(event, Some(PresenceEvent::RosterChanged));
        assert_eq!(channel.peer_count(), 1);

        let event = channel.handle_event(&SyncEvent::PeerLeft {
            peer: "p1".to_string(),
        });
        assert_eq!(event, Some(PresenceEvent::RosterChanged));
        assert_eq!(channel.peer_count(), 0);

        // Leaving twice is a no-op.
        let event = channel.handle_event(&SyncEvent::PeerLeft {
            peer: "p1".to_string(),
        });
        assert_eq!(event, None);
    }

    #[test]
    fn test_color_indices_follow_join_order_and_wrap() {
        let mut channel = PresenceChannel::new(1, "ada");
        for i in 0..COLLABORATOR_COLOR_COUNT + 1 {
            channel.handle_event(&SyncEvent::PeerJoined {
                peer: format!("p{i}"),
            });
        }
        assert_eq!(channel.collaborator("p0").unwrap().color_index, 0);
        assert_eq!(channel.collaborator("p1").unwrap().color_index, 1);
        // Wraps around after the palette is exhausted.
        let last = format!("p{COLLABORATOR_COLOR_COUNT}");
        assert_eq!(channel.collaborator(&last).unwrap().color_index, 0);
    }

    #[test]
    fn test_presence_update_moves_cursor() {
        let mut channel = PresenceChannel::new(1, "ada");
        channel.handle_event(&SyncEvent::PeerJoined {
            peer: "p1".to_string(),
        });

        let event = channel.handle_event(&SyncEvent::PresenceReceived {
            from: "p1".to_string(),
            actor: 42,
            state: PresenceState {
                cursor: Some(CursorPosition { x: 7.0, y: 8.0 }),
                user: Some(UserInfo {
                    name: "grace".to_string(),
                    color_index: 3,
                }),
            },
        });
        assert_eq!(
            event,
            Some(PresenceEvent::PositionChanged {
                peer: "p1".to_string()
            })
        );

        let collab = channel.collaborator("p1").unwrap();
        assert_eq!(collab.name, "grace");
        assert_eq!(collab.actor, Some(42));
        assert_eq!(collab.cursor, Some(Point::new(7.0, 8.0)));
        // Color stays the locally assigned one; it is stable per session.
        assert_eq!(collab.color_index, 0);
    }

    #[test]
    fn test_presence_from_unknown_peer_creates_roster_entry() {
        let mut channel = PresenceChannel::new(1, "ada");
        let event = channel.handle_event(&SyncEvent::PresenceReceived {
            from: "ghost".to_string(),
            actor: 9,
            state: PresenceState::default(),
        });
        assert_eq!(event, Some(PresenceEvent::RosterChanged));
        assert_eq!(channel.peer_count(), 1);
    }

    #[test]
    fn test_disconnect_clears_roster() {
        let mut channel = PresenceChannel::new(1, "ada");
        channel.handle_event(&SyncEvent::PeerJoined {
            peer: "p1".to_string(),
        });
        let event = channel.handle_event(&SyncEvent::Disconnected);
        assert_eq!(event, Some(PresenceEvent::RosterChanged));
        assert_eq!(channel.peer_count(), 0);
    }
}
