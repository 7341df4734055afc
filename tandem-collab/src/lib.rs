//! # tandem-collab - Shared replica and presence layer for Tandem
//!
//! Owns the per-room document replica and the awareness state that the
//! editor session binds to. Merging and transport are delegated: yrs does the
//! CRDT merge, a [`SyncEngine`] moves bytes between replicas.
//!
//! ## Architecture
//!
//! ```text
//!                 Provider::bind({party, room})
//!                            │
//!                            ▼
//! ┌──────────────────── ProviderHandle ────────────────────┐
//! │  SharedReplica (yrs Doc, fragment "default")           │
//! │  Awareness     (local state + remote peers)            │
//! │  status        (Connecting / Connected / Disconnected) │
//! └──────┬───────────────────────────────────▲─────────────┘
//!        │ Outbound::{Update, Awareness}     │ merge_remote / apply_awareness
//!        ▼                                   │
//! ┌─────────────────────────────────────────────────────────┐
//! │ SyncEngine  (MemoryHub in-process, or a network bridge) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`replica`] - yrs-backed document replica and undo history
//! - [`presence`] - awareness model (who is here, where their cursor is)
//! - [`provider`] - the provider seam, handles and scoped subscriptions
//! - [`memory`] - in-process sync engine with offline queue

pub mod error;
pub mod memory;
pub mod presence;
pub mod provider;
pub mod replica;

// Re-exports for convenience
pub use error::CollabError;
pub use memory::{MemoryHub, OfflineQueue};
pub use presence::{
    Awareness, AwarenessUpdate, CursorRange, ParticipantPresence, PresenceChange, PresenceState,
    SessionId, UserProfile, DEFAULT_IDLE_TIMEOUT_SECS,
};
pub use provider::{
    BindRequest, ConnectionState, Outbound, Provider, ProviderEvent, ProviderHandle,
    ProviderSubscription, SyncEngine, WeakProviderHandle, DEFAULT_PARTY,
};
pub use replica::{ReplicaHistory, SharedReplica, UpdateOrigin, DEFAULT_FIELD};
