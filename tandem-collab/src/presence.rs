//! Presence (awareness) state for cursor rendering.
//!
//! Every session publishes a small state (who it is and where its cursor
//! sits), stamped with a per-session clock. Remote states are tracked
//! locally and handed to the cursor renderer.
//!
//! ```text
//! Local cursor move
//!       │
//!       ▼
//! Awareness::set_local_cursor()  ──► AwarenessUpdate { clock + 1 }
//!       │
//!       ▼   (sync engine)
//! Remote Awareness::apply()
//!       │
//!       ▼
//! PresenceChange ──► cursor re-render
//! ```
//!
//! A `None` state means the session left. Updates carrying a clock older
//! than the one already seen for that session are ignored. A live session
//! renews its state every half idle timeout so peers never sweep it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollabError;

/// Idle time after which a silent remote session is swept.
pub const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 30;

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// Opaque per-connection identity minted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identity for a new connection.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selection in document coordinates. `anchor == head` is a caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    pub anchor: u32,
    pub head: u32,
}

impl CursorRange {
    pub fn new(anchor: u32, head: u32) -> Self {
        Self { anchor, head }
    }

    pub fn caret(at: u32) -> Self {
        Self { anchor: at, head: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    pub fn start(&self) -> u32 {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> u32 {
        self.anchor.max(self.head)
    }
}

/// User profile attached to a presence state. Fields are optional because
/// remote states are untrusted and may be partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            color: Some(color.into()),
        }
    }
}

/// What one session publishes about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub user: Option<UserProfile>,
    pub cursor: Option<CursorRange>,
}

/// A remote participant as seen by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantPresence {
    pub id: SessionId,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub cursor: Option<CursorRange>,
}

impl ParticipantPresence {
    pub fn from_state(id: SessionId, state: &PresenceState) -> Self {
        let user = state.user.clone().unwrap_or_default();
        Self {
            id,
            display_name: user.name,
            color: user.color,
            cursor: state.cursor,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Wire messages
// ───────────────────────────────────────────────────────────────────

/// One session's presence state at a given clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwarenessUpdate {
    pub session: SessionId,
    pub clock: u64,
    /// `None` once the session has left.
    pub state: Option<PresenceState>,
}

impl AwarenessUpdate {
    /// Encode to binary (bincode).
    pub fn encode(&self) -> Result<Vec<u8>, CollabError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CollabError::Awareness(e.to_string()))
    }

    /// Decode from binary.
    pub fn decode(bytes: &[u8]) -> Result<Self, CollabError> {
        let (update, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CollabError::Awareness(e.to_string()))?;
        Ok(update)
    }

    pub fn is_leave(&self) -> bool {
        self.state.is_none()
    }
}

/// Which remote sessions changed as the result of an awareness update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChange {
    pub added: Vec<SessionId>,
    pub updated: Vec<SessionId>,
    pub removed: Vec<SessionId>,
}

impl PresenceChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    fn merge(&mut self, other: PresenceChange) {
        self.added.extend(other.added);
        self.updated.extend(other.updated);
        self.removed.extend(other.removed);
    }
}

// ───────────────────────────────────────────────────────────────────
// Awareness: local state plus every known remote state
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PeerEntry {
    clock: u64,
    state: PresenceState,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Departure {
    clock: u64,
    at: DateTime<Utc>,
}

/// Presence bookkeeping for one connection.
#[derive(Debug)]
pub struct Awareness {
    local: SessionId,
    local_clock: u64,
    local_state: Option<PresenceState>,
    local_published: Option<DateTime<Utc>>,
    peers: HashMap<SessionId, PeerEntry>,
    /// Sessions that left, so late updates cannot resurrect them. Pruned on
    /// sweep once older than the idle timeout.
    departed: HashMap<SessionId, Departure>,
    idle_timeout: Duration,
}

impl Awareness {
    pub fn new(local: SessionId) -> Self {
        Self::with_idle_timeout(local, Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn with_idle_timeout(local: SessionId, idle_timeout: Duration) -> Self {
        Self {
            local,
            local_clock: 0,
            local_state: None,
            local_published: None,
            peers: HashMap::new(),
            departed: HashMap::new(),
            idle_timeout,
        }
    }

    pub fn local_session(&self) -> &SessionId {
        &self.local
    }

    pub fn local_state(&self) -> Option<&PresenceState> {
        self.local_state.as_ref()
    }

    /// Current local state as an update, for handshakes with new peers.
    pub fn local_update(&self) -> Option<AwarenessUpdate> {
        self.local_state.as_ref().map(|state| AwarenessUpdate {
            session: self.local.clone(),
            clock: self.local_clock,
            state: Some(state.clone()),
        })
    }

    /// Set the local user profile and return the update to publish.
    pub fn set_local_user(&mut self, user: UserProfile) -> AwarenessUpdate {
        let mut state = self.local_state.take().unwrap_or_default();
        state.user = Some(user);
        self.publish_local(Some(state))
    }

    /// Move the local cursor and return the update to publish.
    pub fn set_local_cursor(&mut self, cursor: Option<CursorRange>) -> AwarenessUpdate {
        let mut state = self.local_state.take().unwrap_or_default();
        state.cursor = cursor;
        self.publish_local(Some(state))
    }

    /// Clear the local state; the returned update tells peers we left.
    pub fn leave(&mut self) -> AwarenessUpdate {
        self.publish_local(None)
    }

    /// Re-publish the local state once half the idle timeout has passed
    /// since it was last published. `None` when nothing is due.
    pub fn renew_local_at(&mut self, now: DateTime<Utc>) -> Option<AwarenessUpdate> {
        let published = self.local_published?;
        if now - published < self.idle_timeout / 2 {
            return None;
        }
        let state = self.local_state.clone()?;
        Some(self.publish_local_at(Some(state), now))
    }

    fn publish_local(&mut self, state: Option<PresenceState>) -> AwarenessUpdate {
        self.publish_local_at(state, Utc::now())
    }

    fn publish_local_at(&mut self, state: Option<PresenceState>, now: DateTime<Utc>) -> AwarenessUpdate {
        self.local_clock += 1;
        self.local_published = state.as_ref().map(|_| now);
        self.local_state = state.clone();
        AwarenessUpdate {
            session: self.local.clone(),
            clock: self.local_clock,
            state,
        }
    }

    /// Apply a remote update received now.
    pub fn apply(&mut self, update: &AwarenessUpdate) -> PresenceChange {
        self.apply_at(update, Utc::now())
    }

    /// Apply a remote update received at `now`.
    pub fn apply_at(&mut self, update: &AwarenessUpdate, now: DateTime<Utc>) -> PresenceChange {
        let mut change = PresenceChange::default();
        if update.session == self.local {
            return change;
        }

        let known_clock = self
            .peers
            .get(&update.session)
            .map(|p| p.clock)
            .or_else(|| self.departed.get(&update.session).map(|d| d.clock));

        if let Some(clock) = known_clock {
            // A leave at the same clock still wins, anything else must be newer.
            let fresh = update.clock > clock || (update.clock == clock && update.is_leave());
            if !fresh {
                log::trace!("Ignoring stale awareness from {} (clock {})", update.session, update.clock);
                return change;
            }
        }

        match &update.state {
            None => {
                if self.peers.remove(&update.session).is_some() {
                    change.removed.push(update.session.clone());
                }
                self.depart(update.session.clone(), update.clock, now);
            }
            Some(state) => {
                self.departed.remove(&update.session);
                let entry = PeerEntry {
                    clock: update.clock,
                    state: state.clone(),
                    last_seen: now,
                };
                match self.peers.insert(update.session.clone(), entry) {
                    None => change.added.push(update.session.clone()),
                    Some(previous) if previous.state != *state => {
                        change.updated.push(update.session.clone())
                    }
                    Some(_) => {}
                }
            }
        }

        change
    }

    fn depart(&mut self, session: SessionId, clock: u64, at: DateTime<Utc>) {
        self.departed.insert(session, Departure { clock, at });
    }

    /// Forget a peer the sync engine reported as disconnected.
    pub fn remove_peer(&mut self, session: &SessionId) -> PresenceChange {
        self.remove_peer_at(session, Utc::now())
    }

    fn remove_peer_at(&mut self, session: &SessionId, now: DateTime<Utc>) -> PresenceChange {
        let mut change = PresenceChange::default();
        if let Some(entry) = self.peers.remove(session) {
            self.depart(session.clone(), entry.clock, now);
            change.removed.push(session.clone());
        }
        change
    }

    /// Drop peers silent for longer than the idle timeout, and departures
    /// older than it.
    pub fn sweep_idle(&mut self, now: DateTime<Utc>) -> PresenceChange {
        let timeout = self.idle_timeout;
        self.departed.retain(|_, d| now - d.at <= timeout);

        let stale: Vec<SessionId> = self
            .peers
            .iter()
            .filter(|(_, p)| now - p.last_seen > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut change = PresenceChange::default();
        for id in &stale {
            change.merge(self.remove_peer_at(id, now));
        }
        change
    }

    /// All remote participants, ordered by session id.
    pub fn participants(&self) -> Vec<ParticipantPresence> {
        let mut participants: Vec<ParticipantPresence> = self
            .peers
            .iter()
            .map(|(id, entry)| ParticipantPresence::from_state(id.clone(), &entry.state))
            .collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));
        participants
    }

    pub fn participant(&self, session: &SessionId) -> Option<ParticipantPresence> {
        self.peers
            .get(session)
            .map(|entry| ParticipantPresence::from_state(session.clone(), &entry.state))
    }

    /// Number of remote peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Departed sessions still remembered.
    pub fn departed_count(&self) -> usize {
        self.departed.len()
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(session: &SessionId, clock: u64, name: &str) -> AwarenessUpdate {
        AwarenessUpdate {
            session: session.clone(),
            clock,
            state: Some(PresenceState {
                user: Some(UserProfile::new(name, "#FFD700")),
                cursor: None,
            }),
        }
    }

    #[test]
    fn test_session_id_random_distinct() {
        let a = SessionId::random();
        let b = SessionId::random();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_cursor_range_bounds() {
        let range = CursorRange::new(9, 3);
        assert_eq!(range.start(), 3);
        assert_eq!(range.end(), 9);
        assert!(!range.is_collapsed());
        assert!(CursorRange::caret(4).is_collapsed());
    }

    #[test]
    fn test_awareness_update_roundtrip() {
        let update = AwarenessUpdate {
            session: SessionId::new("s-1"),
            clock: 7,
            state: Some(PresenceState {
                user: Some(UserProfile::new("Ada", "#FFD700")),
                cursor: Some(CursorRange::new(1, 5)),
            }),
        };
        let decoded = AwarenessUpdate::decode(&update.encode().unwrap()).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn test_awareness_decode_garbage() {
        assert!(AwarenessUpdate::decode(&[0xFF]).is_err());
    }

    #[test]
    fn test_local_updates_bump_clock() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        let first = awareness.set_local_user(UserProfile::new("me", "#98FB98"));
        let second = awareness.set_local_cursor(Some(CursorRange::caret(3)));

        assert!(second.clock > first.clock);
        let state = awareness.local_state().unwrap();
        assert_eq!(state.cursor, Some(CursorRange::caret(3)));
        assert_eq!(state.user.as_ref().unwrap().name.as_deref(), Some("me"));

        let leave = awareness.leave();
        assert!(leave.is_leave());
        assert!(awareness.local_update().is_none());
    }

    #[test]
    fn test_apply_join_and_update() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        let bob = SessionId::new("bob");

        let change = awareness.apply(&joined(&bob, 1, "Bob"));
        assert_eq!(change.added, vec![bob.clone()]);
        assert_eq!(awareness.peer_count(), 1);

        let mut moved = joined(&bob, 2, "Bob");
        moved.state.as_mut().unwrap().cursor = Some(CursorRange::caret(10));
        let change = awareness.apply(&moved);
        assert_eq!(change.updated, vec![bob.clone()]);
        assert_eq!(
            awareness.participant(&bob).unwrap().cursor,
            Some(CursorRange::caret(10))
        );
    }

    #[test]
    fn test_apply_ignores_self() {
        let me = SessionId::new("me");
        let mut awareness = Awareness::new(me.clone());
        let change = awareness.apply(&joined(&me, 1, "Self"));
        assert!(change.is_empty());
        assert_eq!(awareness.peer_count(), 0);
    }

    #[test]
    fn test_apply_rejects_stale_clock() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        let bob = SessionId::new("bob");
        awareness.apply(&joined(&bob, 5, "Bob"));

        let change = awareness.apply(&joined(&bob, 3, "Old Bob"));
        assert!(change.is_empty());
        assert_eq!(
            awareness.participant(&bob).unwrap().display_name.as_deref(),
            Some("Bob")
        );
    }

    #[test]
    fn test_leave_removes_and_blocks_resurrection() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        let bob = SessionId::new("bob");
        awareness.apply(&joined(&bob, 2, "Bob"));

        let change = awareness.apply(&AwarenessUpdate {
            session: bob.clone(),
            clock: 2,
            state: None,
        });
        assert_eq!(change.removed, vec![bob.clone()]);
        assert_eq!(awareness.peer_count(), 0);

        // Delayed update from before the leave.
        assert!(awareness.apply(&joined(&bob, 1, "Bob")).is_empty());
        // Rejoin with a newer clock.
        assert_eq!(awareness.apply(&joined(&bob, 3, "Bob")).added, vec![bob]);
    }

    #[test]
    fn test_identical_state_is_not_a_change() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        let bob = SessionId::new("bob");
        awareness.apply(&joined(&bob, 1, "Bob"));
        assert!(awareness.apply(&joined(&bob, 2, "Bob")).is_empty());
    }

    #[test]
    fn test_sweep_idle_peers() {
        let mut awareness =
            Awareness::with_idle_timeout(SessionId::new("me"), Duration::seconds(30));
        let t0 = Utc::now();
        let bob = SessionId::new("bob");
        let eve = SessionId::new("eve");
        awareness.apply_at(&joined(&bob, 1, "Bob"), t0);
        awareness.apply_at(&joined(&eve, 1, "Eve"), t0 + Duration::seconds(20));

        let change = awareness.sweep_idle(t0 + Duration::seconds(40));
        assert_eq!(change.removed, vec![bob]);
        assert_eq!(awareness.peer_count(), 1);
    }

    #[test]
    fn test_renewed_peer_survives_sweep() {
        let alice = SessionId::new("alice");
        let mut local = Awareness::with_idle_timeout(alice.clone(), Duration::seconds(30));
        let mut remote =
            Awareness::with_idle_timeout(SessionId::new("bob"), Duration::seconds(30));
        let t0 = Utc::now();

        let join = local.set_local_user(UserProfile::new("Alice", "#FFD700"));
        remote.apply_at(&join, t0);

        assert!(local.renew_local_at(t0 + Duration::seconds(10)).is_none());
        let renewal = local.renew_local_at(t0 + Duration::seconds(20)).unwrap();
        assert!(renewal.clock > join.clock);
        assert_eq!(renewal.state, join.state);
        // Same state, so peers see no change, only a fresh last-seen.
        assert!(remote.apply_at(&renewal, t0 + Duration::seconds(20)).is_empty());
        assert!(local.renew_local_at(t0 + Duration::seconds(25)).is_none());

        assert!(remote.sweep_idle(t0 + Duration::seconds(40)).is_empty());
        assert_eq!(remote.peer_count(), 1);
        assert_eq!(remote.sweep_idle(t0 + Duration::seconds(60)).removed, vec![alice]);
    }

    #[test]
    fn test_nothing_to_renew_without_local_state() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        let later = Utc::now() + Duration::seconds(60);
        assert!(awareness.renew_local_at(later).is_none());

        awareness.set_local_user(UserProfile::new("me", "#98FB98"));
        awareness.leave();
        assert!(awareness.renew_local_at(later).is_none());
    }

    #[test]
    fn test_sweep_prunes_old_departures() {
        let mut awareness =
            Awareness::with_idle_timeout(SessionId::new("me"), Duration::seconds(30));
        let t0 = Utc::now();
        let bob = SessionId::new("bob");
        let eve = SessionId::new("eve");
        awareness.apply_at(&joined(&bob, 1, "Bob"), t0);
        awareness.apply_at(&AwarenessUpdate { session: bob.clone(), clock: 2, state: None }, t0);
        awareness.apply_at(&joined(&eve, 1, "Eve"), t0 + Duration::seconds(20));
        awareness.apply_at(
            &AwarenessUpdate { session: eve.clone(), clock: 2, state: None },
            t0 + Duration::seconds(20),
        );
        assert_eq!(awareness.departed_count(), 2);

        awareness.sweep_idle(t0 + Duration::seconds(40));
        assert_eq!(awareness.departed_count(), 1);
        // Eve's tombstone still blocks her delayed update.
        assert!(awareness.apply_at(&joined(&eve, 1, "Eve"), t0 + Duration::seconds(41)).is_empty());

        awareness.sweep_idle(t0 + Duration::seconds(60));
        assert_eq!(awareness.departed_count(), 0);
    }

    #[test]
    fn test_participants_sorted_and_partial() {
        let mut awareness = Awareness::new(SessionId::new("me"));
        awareness.apply(&joined(&SessionId::new("zed"), 1, "Zed"));
        awareness.apply(&AwarenessUpdate {
            session: SessionId::new("anon"),
            clock: 1,
            state: Some(PresenceState::default()),
        });

        let participants = awareness.participants();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].id.as_str(), "anon");
        assert_eq!(participants[0].display_name, None);
        assert_eq!(participants[0].color, None);
        assert_eq!(participants[1].display_name.as_deref(), Some("Zed"));
    }
}
