//! Provider seam between a session and the external sync engine.
//!
//! A [`Provider`] binds `{party, room}` to a [`ProviderHandle`]. The handle
//! owns the room's [`SharedReplica`] and [`Awareness`], forwards local
//! changes to the [`SyncEngine`] and fans incoming changes out to
//! subscribers as [`ProviderEvent`]s.
//!
//! ```text
//!            ┌──────────────── ProviderHandle ────────────────┐
//!  editor ──►│ replica.apply_local ──► observer ──► publish ──┼──► SyncEngine
//!            │ set_local_cursor    ──────────────► publish ──┼──►
//!            │                                               │
//!  Session ◄─┼── ProviderSubscription ◄── emit ◄── merge_remote / apply_awareness ◄── SyncEngine
//!            └───────────────────────────────────────────────┘
//! ```
//!
//! Reconnection, retry and persistence all belong to the engine; the handle
//! is usable (empty replica, empty presence) before the first connect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use yrs::Subscription;

use crate::error::CollabError;
use crate::presence::{
    Awareness, AwarenessUpdate, CursorRange, ParticipantPresence, PresenceChange, PresenceState,
    SessionId, UserProfile,
};
use crate::replica::{SharedReplica, UpdateOrigin};

/// Channel namespace used for document rooms.
pub const DEFAULT_PARTY: &str = "document";

/// Client connection state, as reported by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Parameters of a provider binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindRequest {
    pub party: String,
    pub room: String,
}

impl BindRequest {
    pub fn new(party: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            room: room.into(),
        }
    }

    /// Binding in the default `document` party.
    pub fn document(room: impl Into<String>) -> Self {
        Self::new(DEFAULT_PARTY, room)
    }
}

/// Local change handed to the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// v1-encoded replica delta.
    Update(Vec<u8>),
    Awareness(AwarenessUpdate),
}

/// The external engine that moves changes between replicas.
pub trait SyncEngine: Send + Sync {
    /// Deliver a local change from `from` to the rest of the room.
    fn publish(&self, from: &SessionId, message: Outbound);

    /// The session was released or its handle is gone; release its
    /// connection. Called at most once per session.
    fn release(&self, _session: &SessionId) {}
}

/// Binds a room to a live connection handle.
pub trait Provider {
    fn bind(&self, request: &BindRequest) -> Result<ProviderHandle, CollabError>;
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Status(ConnectionState),
    Presence(PresenceChange),
    Replica(UpdateOrigin),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<ProviderEvent>>,
}

struct HandleInner {
    request: BindRequest,
    session: SessionId,
    replica: SharedReplica,
    awareness: Mutex<Awareness>,
    status: watch::Sender<ConnectionState>,
    subscribers: Mutex<Subscribers>,
    engine: Arc<dyn SyncEngine>,
    replica_observer: Mutex<Option<Subscription>>,
    released: AtomicBool,
}

impl HandleInner {
    fn emit(&self, event: ProviderEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn publish_awareness(&self, update: AwarenessUpdate) {
        if !self.is_released() {
            self.engine.publish(&self.session, Outbound::Awareness(update));
        }
    }

    fn release_connection(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("Releasing session {} in room {}", self.session, self.request.room);
        self.engine.release(&self.session);
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.release_connection();
    }
}

/// Live connection to one room.
///
/// Cloning yields another reference to the same connection; the connection
/// is released when the last clone is dropped.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<HandleInner>,
}

impl ProviderHandle {
    /// Create a handle for `session`, wiring replica changes to `engine`.
    ///
    /// Called by providers; the handle starts out `Connecting`.
    pub fn new(
        request: BindRequest,
        session: SessionId,
        field: &str,
        engine: Arc<dyn SyncEngine>,
    ) -> Result<Self, CollabError> {
        let (status, _) = watch::channel(ConnectionState::Connecting);
        let inner = Arc::new(HandleInner {
            awareness: Mutex::new(Awareness::new(session.clone())),
            request,
            session,
            replica: SharedReplica::new(field),
            status,
            subscribers: Mutex::new(Subscribers::default()),
            engine,
            replica_observer: Mutex::new(None),
            released: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let observer = inner.replica.observe(move |origin, update| {
            let Some(inner) = weak.upgrade() else { return };
            if origin == UpdateOrigin::Local && !inner.is_released() {
                inner
                    .engine
                    .publish(&inner.session, Outbound::Update(update.to_vec()));
            }
            inner.emit(ProviderEvent::Replica(origin));
        })?;
        *lock(&inner.replica_observer) = Some(observer);

        Ok(Self { inner })
    }

    pub fn request(&self) -> &BindRequest {
        &self.inner.request
    }

    pub fn room(&self) -> &str {
        &self.inner.request.room
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session
    }

    /// The room's replica. Mutate it only through `apply_local`.
    pub fn replica(&self) -> &SharedReplica {
        &self.inner.replica
    }

    // ==================== Connection lifecycle ====================

    pub fn status(&self) -> ConnectionState {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    /// Report a connection state change. Called by the sync engine.
    pub fn set_status(&self, state: ConnectionState) {
        let changed = self.inner.status.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            match state {
                ConnectionState::Connected => {
                    log::info!("Session {} connected to {}", self.session_id(), self.room())
                }
                ConnectionState::Connecting => log::warn!("Session {} reconnecting", self.session_id()),
                ConnectionState::Disconnected => {
                    log::warn!("Session {} disconnected", self.session_id())
                }
            }
            self.inner.emit(ProviderEvent::Status(state));
        }
    }

    // ==================== Subscriptions ====================

    /// Subscribe to provider events. Dropping the returned guard unsubscribes.
    pub fn subscribe(&self) -> ProviderSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut subscribers = lock(&self.inner.subscribers);
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.senders.insert(id, tx);
            id
        };
        ProviderSubscription {
            id,
            rx,
            handle: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.subscribers).senders.len()
    }

    /// Drop every subscription and mark the handle disconnected.
    ///
    /// Pending `recv()` calls on subscriptions resolve to `None`.
    pub fn close(&self) {
        self.leave();
        self.set_status(ConnectionState::Disconnected);
        lock(&self.inner.subscribers).senders.clear();
    }

    /// Close the handle and hand the connection back to the engine, even
    /// while clones are still alive. Idempotent.
    pub fn release(&self) {
        self.close();
        self.inner.release_connection();
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    // ==================== Presence ====================

    /// Remote participants currently known.
    pub fn presence(&self) -> Vec<ParticipantPresence> {
        lock(&self.inner.awareness).participants()
    }

    pub fn local_presence(&self) -> Option<PresenceState> {
        lock(&self.inner.awareness).local_state().cloned()
    }

    /// Local state as an update, for the engine's handshake with new peers.
    pub fn local_awareness(&self) -> Option<AwarenessUpdate> {
        lock(&self.inner.awareness).local_update()
    }

    pub fn set_local_user(&self, user: UserProfile) {
        let update = lock(&self.inner.awareness).set_local_user(user);
        self.inner.publish_awareness(update);
    }

    pub fn set_local_cursor(&self, cursor: Option<CursorRange>) {
        let update = lock(&self.inner.awareness).set_local_cursor(cursor);
        self.inner.publish_awareness(update);
    }

    /// Re-publish the local presence if it is due, so peers do not sweep
    /// it as idle. Returns whether an update went out.
    pub fn renew_local(&self) -> bool {
        if self.is_released() {
            return false;
        }
        let update = lock(&self.inner.awareness).renew_local_at(chrono::Utc::now());
        match update {
            Some(update) => {
                log::trace!("Renewing presence of {}", self.session_id());
                self.inner.publish_awareness(update);
                true
            }
            None => false,
        }
    }

    /// Withdraw the local presence state, if any was published.
    pub fn leave(&self) {
        let update = {
            let mut awareness = lock(&self.inner.awareness);
            if awareness.local_state().is_none() {
                return;
            }
            awareness.leave()
        };
        self.inner.publish_awareness(update);
    }

    /// Apply a remote presence update. Called by the sync engine.
    pub fn apply_awareness(&self, update: &AwarenessUpdate) {
        let change = lock(&self.inner.awareness).apply(update);
        self.emit_presence(change);
    }

    /// Forget a peer whose connection the engine saw close.
    pub fn drop_peer(&self, session: &SessionId) {
        let change = lock(&self.inner.awareness).remove_peer(session);
        self.emit_presence(change);
    }

    /// Sweep remote peers that have gone quiet.
    pub fn sweep_idle(&self) -> PresenceChange {
        let change = lock(&self.inner.awareness).sweep_idle(chrono::Utc::now());
        self.emit_presence(change.clone());
        change
    }

    fn emit_presence(&self, change: PresenceChange) {
        if !change.is_empty() {
            log::trace!("Presence change in {}: {:?}", self.room(), change);
            self.inner.emit(ProviderEvent::Presence(change));
        }
    }

    // ==================== Replica ====================

    /// Merge a remote replica delta. Called by the sync engine; ignored
    /// once the handle is released.
    pub fn merge_remote(&self, update: &[u8]) -> Result<(), CollabError> {
        if self.is_released() {
            log::trace!("Session {} released, dropping remote update", self.session_id());
            return Ok(());
        }
        self.inner.replica.merge_remote(update)
    }

    pub fn downgrade(&self) -> WeakProviderHandle {
        WeakProviderHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("request", &self.inner.request)
            .field("session", &self.inner.session)
            .field("status", &self.status())
            .finish()
    }
}

/// Non-owning reference held by sync engines.
#[derive(Clone)]
pub struct WeakProviderHandle {
    inner: Weak<HandleInner>,
}

impl WeakProviderHandle {
    pub fn upgrade(&self) -> Option<ProviderHandle> {
        self.inner.upgrade().map(|inner| ProviderHandle { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// Scoped subscription to a handle's events.
pub struct ProviderSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ProviderEvent>,
    handle: Weak<HandleInner>,
}

impl ProviderSubscription {
    /// Wait for the next event. `None` once the handle is closed or gone.
    pub async fn recv(&mut self) -> Option<ProviderEvent> {
        self.rx.recv().await
    }

    /// Next pending event without waiting.
    pub fn try_recv(&mut self) -> Option<ProviderEvent> {
        self.rx.try_recv().ok()
    }

    /// Every pending event.
    pub fn drain(&mut self) -> Vec<ProviderEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.handle.upgrade() {
            lock(&inner.subscribers).senders.remove(&self.id);
        }
    }
}
