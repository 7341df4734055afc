//! In-process sync engine.
//!
//! `MemoryHub` connects every handle bound to the same `{party, room}` inside
//! one process. It stands in for the hosted room server in tests, benches and
//! native demos, and follows the same contract: state-vector handshake on
//! join, fan-out of deltas and awareness, and queued replay after an outage.
//!
//! ```text
//!   handle A ──publish──►┌──────── Room ────────┐──merge_remote──► handle B
//!                        │ online?  members      │──apply_awareness► handle C
//!                        │ offline queue per sid │
//!                        └───────────────────────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::CollabError;
use crate::presence::SessionId;
use crate::provider::{
    BindRequest, ConnectionState, Outbound, Provider, ProviderHandle, SyncEngine,
    WeakProviderHandle,
};
use crate::replica::DEFAULT_FIELD;

/// Default cap on deltas queued per session while the room is unreachable.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────────
// Offline queue
// ───────────────────────────────────────────────────────────────────

/// Deltas produced while disconnected, replayed in order on reconnect.
///
/// Awareness is never queued: a stale cursor is worthless after an outage,
/// and the reconnect handshake republishes the current one.
#[derive(Debug)]
pub struct OfflineQueue {
    queue: VecDeque<Vec<u8>>,
    max_size: usize,
}

impl OfflineQueue {
    /// Create a new offline queue with max capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a delta for later replay. Returns `false` if the queue is full.
    pub fn enqueue(&mut self, payload: Vec<u8>) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(payload);
        true
    }

    /// Drain all queued deltas, oldest first.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total bytes queued.
    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(Vec::len).sum()
    }
}

// ───────────────────────────────────────────────────────────────────
// Rooms
// ───────────────────────────────────────────────────────────────────

struct Member {
    handle: WeakProviderHandle,
    queue: OfflineQueue,
}

struct RoomState {
    online: bool,
    members: HashMap<SessionId, Member>,
}

struct Room {
    request: BindRequest,
    queue_capacity: usize,
    state: Mutex<RoomState>,
}

impl Room {
    /// Live handles other than `except`.
    fn peers(state: &RoomState, except: &SessionId) -> Vec<ProviderHandle> {
        state
            .members
            .iter()
            .filter(|(id, _)| *id != except)
            .filter_map(|(_, member)| member.handle.upgrade())
            .collect()
    }

    fn deliver(&self, peers: &[ProviderHandle], message: &Outbound) {
        for peer in peers {
            match message {
                Outbound::Update(update) => {
                    if let Err(e) = peer.merge_remote(update) {
                        log::error!(
                            "Dropping update for {} in {}: {}",
                            peer.session_id(),
                            self.request.room,
                            e
                        );
                    }
                }
                Outbound::Awareness(update) => peer.apply_awareness(update),
            }
        }
    }
}

impl SyncEngine for Room {
    fn publish(&self, from: &SessionId, message: Outbound) {
        let peers = {
            let mut state = lock(&self.state);
            if !state.members.contains_key(from) {
                log::trace!("Ignoring publish from released session {}", from);
                return;
            }
            if !state.online {
                if let (Outbound::Update(update), Some(member)) =
                    (&message, state.members.get_mut(from))
                {
                    if !member.queue.enqueue(update.clone()) {
                        log::warn!("Offline queue full for {}, relying on resync", from);
                    }
                }
                return;
            }
            Room::peers(&state, from)
        };
        self.deliver(&peers, &message);
    }

    fn release(&self, session: &SessionId) {
        let peers = {
            let mut state = lock(&self.state);
            state.members.remove(session);
            Room::peers(&state, session)
        };
        for peer in peers {
            peer.drop_peer(session);
        }
    }
}

/// Bring `joining` up to date with `peers` and vice versa.
fn handshake(joining: &ProviderHandle, peers: &[ProviderHandle]) {
    for peer in peers {
        let sync = joining
            .replica()
            .encode_diff(&peer.replica().state_vector())
            .and_then(|missing| peer.merge_remote(&missing))
            .and_then(|()| peer.replica().encode_diff(&joining.replica().state_vector()))
            .and_then(|missing| joining.merge_remote(&missing));
        if let Err(e) = sync {
            log::error!(
                "Handshake between {} and {} failed: {}",
                joining.session_id(),
                peer.session_id(),
                e
            );
        }
        if let Some(update) = peer.local_awareness() {
            joining.apply_awareness(&update);
        }
        if let Some(update) = joining.local_awareness() {
            peer.apply_awareness(&update);
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Hub
// ───────────────────────────────────────────────────────────────────

/// Provider connecting all handles bound through it.
#[derive(Clone)]
pub struct MemoryHub {
    rooms: Arc<Mutex<HashMap<BindRequest, Arc<Room>>>>,
    start_online: bool,
    queue_capacity: usize,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    /// Create a hub whose rooms are reachable.
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            start_online: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Create a hub whose rooms start unreachable until `set_online`.
    pub fn offline() -> Self {
        Self {
            start_online: false,
            ..Self::new()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    fn room(&self, request: &BindRequest) -> Arc<Room> {
        let mut rooms = lock(&self.rooms);
        rooms
            .entry(request.clone())
            .or_insert_with(|| {
                Arc::new(Room {
                    request: request.clone(),
                    queue_capacity: self.queue_capacity,
                    state: Mutex::new(RoomState {
                        online: self.start_online,
                        members: HashMap::new(),
                    }),
                })
            })
            .clone()
    }

    /// Take a room down or bring it back.
    ///
    /// Coming back replays each session's queued deltas, runs the join
    /// handshake between all members and reports them connected.
    pub fn set_online(&self, request: &BindRequest, online: bool) {
        let room = self.room(request);
        let (members, replay) = {
            let mut state = lock(&room.state);
            if state.online == online {
                return;
            }
            state.online = online;
            let mut replay = Vec::new();
            if online {
                for (id, member) in state.members.iter_mut() {
                    replay.push((id.clone(), member.queue.drain()));
                }
            }
            let members: Vec<ProviderHandle> = state
                .members
                .values()
                .filter_map(|m| m.handle.upgrade())
                .collect();
            (members, replay)
        };

        if !online {
            log::warn!("Room {} went offline", request.room);
            for member in &members {
                member.set_status(ConnectionState::Disconnected);
            }
            return;
        }

        log::info!("Room {} back online, replaying queued deltas", request.room);
        for (from, updates) in replay {
            let peers: Vec<ProviderHandle> = members
                .iter()
                .filter(|m| *m.session_id() != from)
                .cloned()
                .collect();
            for update in updates {
                room.deliver(&peers, &Outbound::Update(update));
            }
        }
        for (i, member) in members.iter().enumerate() {
            handshake(member, &members[i + 1..]);
        }
        for member in &members {
            member.set_status(ConnectionState::Connected);
        }
    }

    /// Number of live handles bound to `request`.
    pub fn room_size(&self, request: &BindRequest) -> usize {
        let Some(room) = lock(&self.rooms).get(request).cloned() else {
            return 0;
        };
        let state = lock(&room.state);
        state
            .members
            .values()
            .filter(|m| m.handle.is_alive())
            .count()
    }

    /// Deltas waiting for `request` to come back online.
    pub fn queued(&self, request: &BindRequest) -> usize {
        let Some(room) = lock(&self.rooms).get(request).cloned() else {
            return 0;
        };
        let state = lock(&room.state);
        state.members.values().map(|m| m.queue.len()).sum()
    }
}

impl Provider for MemoryHub {
    fn bind(&self, request: &BindRequest) -> Result<ProviderHandle, CollabError> {
        let room = self.room(request);
        let session = SessionId::random();
        let handle = ProviderHandle::new(
            request.clone(),
            session.clone(),
            DEFAULT_FIELD,
            room.clone(),
        )?;

        let (online, peers) = {
            let mut state = lock(&room.state);
            let peers = Room::peers(&state, &session);
            state.members.insert(
                session.clone(),
                Member {
                    handle: handle.downgrade(),
                    queue: OfflineQueue::new(room.queue_capacity),
                },
            );
            (state.online, peers)
        };

        log::debug!(
            "Bound session {} to {}/{} ({} peers)",
            session,
            request.party,
            request.room,
            peers.len()
        );

        if online {
            handshake(&handle, &peers);
            handle.set_status(ConnectionState::Connected);
        }
        Ok(handle)
    }
}
