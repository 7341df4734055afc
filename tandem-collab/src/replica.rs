//! Shared document replica backed by a yrs `Doc`.
//!
//! The replica is owned by the provider handle. It has exactly two mutation
//! entry points, both of which run inside a yrs transaction so that the CRDT
//! merge function sees every change:
//!
//! ```text
//!  local input ──► SharedReplica::apply_local()  ──┐
//!                                                  ├──► yrs Doc ──► observers
//!  sync engine ──► SharedReplica::merge_remote() ──┘
//! ```
//!
//! Transactions are tagged with an origin so observers (and the undo
//! manager) can tell local edits from merged remote deltas.

use std::sync::Arc;

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, GetString, Origin, ReadTxn, StateVector, Subscription, Transact, Transaction,
    TransactionMut, UndoManager, Update, XmlFragment, XmlFragmentRef,
};

use crate::error::CollabError;

/// Name of the XML fragment the editing engine binds to.
pub const DEFAULT_FIELD: &str = "default";

const LOCAL_ORIGIN: &str = "tandem-local";
const REMOTE_ORIGIN: &str = "tandem-remote";

/// Where a replica change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Local input, including undo/redo.
    Local,
    /// A delta merged from the sync engine.
    Remote,
}

impl UpdateOrigin {
    fn of(txn: &TransactionMut) -> Self {
        match txn.origin() {
            Some(origin) if *origin == Origin::from(REMOTE_ORIGIN) => UpdateOrigin::Remote,
            _ => UpdateOrigin::Local,
        }
    }
}

/// Conflict-free replica of one room's document.
///
/// Cloning is cheap and yields another view of the same replica.
#[derive(Clone)]
pub struct SharedReplica {
    doc: Arc<Doc>,
    fragment: XmlFragmentRef,
    field: Arc<str>,
}

impl SharedReplica {
    /// Create an empty replica whose content lives in the XML fragment `field`.
    pub fn new(field: &str) -> Self {
        let doc = Doc::new();
        let fragment = doc.get_or_insert_xml_fragment(field);
        Self {
            doc: Arc::new(doc),
            fragment,
            field: Arc::from(field),
        }
    }

    /// Name of the bound XML fragment.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Apply a local edit.
    ///
    /// The closure runs inside a transaction tagged as local; the resulting
    /// delta is handed to observers when the transaction commits.
    pub fn apply_local<F, R>(&self, edit: F) -> R
    where
        F: FnOnce(&mut TransactionMut, &XmlFragmentRef) -> R,
    {
        let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
        edit(&mut txn, &self.fragment)
    }

    /// Apply a v1 update produced by an editing engine's own document.
    ///
    /// The update is tagged as local, so it is published and undoable.
    pub fn apply_local_update(&self, update: &[u8]) -> Result<(), CollabError> {
        let update = Update::decode_v1(update).map_err(|e| CollabError::Decode(e.to_string()))?;
        let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
        txn.apply_update(update)
            .map_err(|e| CollabError::Merge(e.to_string()))
    }

    /// Merge a v1-encoded update received from the sync engine.
    pub fn merge_remote(&self, update: &[u8]) -> Result<(), CollabError> {
        let update = Update::decode_v1(update).map_err(|e| CollabError::Decode(e.to_string()))?;
        let mut txn = self.doc.transact_mut_with(REMOTE_ORIGIN);
        txn.apply_update(update)
            .map_err(|e| CollabError::Merge(e.to_string()))
    }

    /// Read the bound fragment.
    pub fn read<F, R>(&self, view: F) -> R
    where
        F: FnOnce(&Transaction, &XmlFragmentRef) -> R,
    {
        let txn = self.doc.transact();
        view(&txn, &self.fragment)
    }

    /// Serialized XML of the bound fragment.
    pub fn to_xml(&self) -> String {
        self.read(|txn, fragment| fragment.get_string(txn))
    }

    /// Number of top-level nodes in the bound fragment.
    pub fn len(&self) -> u32 {
        self.read(|txn, fragment| fragment.len(txn))
    }

    /// Whether the replica holds no content yet (e.g. before the first sync).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// v1-encoded state vector, used for the sync handshake.
    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Full replica state as a single v1 update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    /// Everything this replica has that a peer with `remote_state_vector` lacks.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>, CollabError> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| CollabError::Decode(e.to_string()))?;
        Ok(self.doc.transact().encode_state_as_update_v1(&sv))
    }

    /// Observe every committed change as a v1 update.
    pub fn observe<F>(&self, callback: F) -> Result<Subscription, CollabError>
    where
        F: Fn(UpdateOrigin, &[u8]) + Send + Sync + 'static,
    {
        self.doc
            .observe_update_v1(move |txn, event| callback(UpdateOrigin::of(txn), &event.update))
            .map_err(|e| CollabError::Observe(format!("{e:?}")))
    }

    /// CRDT-aware undo history scoped to the bound fragment.
    ///
    /// Only local transactions are tracked, so undo never reverts a
    /// collaborator's edit.
    pub fn history(&self) -> ReplicaHistory {
        let mut manager = UndoManager::new(&self.doc, &self.fragment);
        manager.include_origin(LOCAL_ORIGIN);
        ReplicaHistory { manager }
    }
}

impl std::fmt::Debug for SharedReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedReplica")
            .field("field", &self.field)
            .field("len", &self.len())
            .finish()
    }
}

/// Undo/redo over the replica, replacing the editing engine's own history.
pub struct ReplicaHistory {
    manager: UndoManager,
}

impl ReplicaHistory {
    /// Revert the last local change. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.manager.undo_blocking()
    }

    /// Re-apply the last undone change.
    pub fn redo(&mut self) -> bool {
        self.manager.redo_blocking()
    }

    pub fn can_undo(&self) -> bool {
        self.manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.manager.can_redo()
    }
}
