//! Bridge to a JavaScript network provider (e.g. a PartyKit socket).
//!
//! Rust hands outbound deltas and awareness to `publishUpdate` /
//! `publishAwareness`; the JavaScript side feeds inbound traffic back
//! through the [`RoomConnection`] it receives in `connect`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use tandem_collab::{
    AwarenessUpdate, BindRequest, CollabError, ConnectionState, Outbound, Provider, ProviderHandle,
    SessionId, SyncEngine, WeakProviderHandle, DEFAULT_FIELD,
};
use wasm_bindgen::prelude::*;

use crate::browser::js_error_message;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(typescript_type = "NetworkCallbacks")]
    pub type NetworkCallbacks;

    #[wasm_bindgen(method, catch)]
    fn connect(
        this: &NetworkCallbacks,
        party: &str,
        room: &str,
        connection: RoomConnection,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = "publishUpdate")]
    fn publish_update(this: &NetworkCallbacks, room: &str, update: &[u8]) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = "publishAwareness")]
    fn publish_awareness(this: &NetworkCallbacks, room: &str, update: &[u8])
        -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn release(this: &NetworkCallbacks, room: &str, session: &str) -> Result<(), JsValue>;
}

#[wasm_bindgen(typescript_custom_section)]
const TS_NETWORK: &'static str = r#"
interface NetworkCallbacks {
    connect(party: string, room: string, connection: RoomConnection): void;
    publishUpdate(room: string, update: Uint8Array): void;
    publishAwareness(room: string, update: Uint8Array): void;
    release(room: string, session: string): void;
}
"#;

struct Registered {
    callbacks: NetworkCallbacks,
    leases: usize,
}

// JS values never leave the main thread, so engines refer to their
// callbacks by id.
thread_local! {
    static NETWORKS: RefCell<HashMap<u32, Registered>> = RefCell::new(HashMap::new());
    static NEXT_NETWORK: Cell<u32> = const { Cell::new(0) };
}

/// Number of callback objects currently registered.
pub fn registered_networks() -> usize {
    NETWORKS.with(|networks| networks.borrow().len())
}

/// Counted reference to registered callbacks. The last lease unregisters
/// them.
struct NetworkLease {
    id: u32,
}

impl NetworkLease {
    fn register(callbacks: NetworkCallbacks) -> Self {
        let id = NEXT_NETWORK.with(|next| {
            let id = next.get();
            next.set(id.wrapping_add(1));
            id
        });
        NETWORKS.with(|networks| {
            networks
                .borrow_mut()
                .insert(id, Registered { callbacks, leases: 1 })
        });
        Self { id }
    }

    fn with<T, F: FnOnce(&NetworkCallbacks) -> T>(&self, f: F) -> Option<T> {
        NETWORKS.with(|networks| networks.borrow().get(&self.id).map(|n| f(&n.callbacks)))
    }

    fn call<F>(&self, what: &str, f: F)
    where
        F: FnOnce(&NetworkCallbacks) -> Result<(), JsValue>,
    {
        match self.with(f) {
            Some(Ok(())) => {}
            Some(Err(e)) => log::warn!("Network {} failed: {}", what, js_error_message(&e)),
            None => log::warn!("Network {} is gone", self.id),
        }
    }
}

impl Clone for NetworkLease {
    fn clone(&self) -> Self {
        NETWORKS.with(|networks| {
            if let Some(registered) = networks.borrow_mut().get_mut(&self.id) {
                registered.leases += 1;
            }
        });
        Self { id: self.id }
    }
}

impl Drop for NetworkLease {
    fn drop(&mut self) {
        // The registry may already be gone during thread teardown.
        let _ = NETWORKS.try_with(|networks| {
            let mut networks = networks.borrow_mut();
            let last = match networks.get_mut(&self.id) {
                Some(registered) => {
                    registered.leases -= 1;
                    registered.leases == 0
                }
                None => false,
            };
            if last {
                networks.remove(&self.id);
                log::debug!("Unregistered network {}", self.id);
            }
        });
    }
}

struct JsSyncEngine {
    network: NetworkLease,
    room: String,
}

impl SyncEngine for JsSyncEngine {
    fn publish(&self, _from: &SessionId, message: Outbound) {
        match message {
            Outbound::Update(update) => self
                .network
                .call("publishUpdate", |n| n.publish_update(&self.room, &update)),
            Outbound::Awareness(update) => match update.encode() {
                Ok(bytes) => self
                    .network
                    .call("publishAwareness", |n| n.publish_awareness(&self.room, &bytes)),
                Err(e) => log::error!("Dropping awareness update: {}", e),
            },
        }
    }

    fn release(&self, session: &SessionId) {
        self.network
            .call("release", |n| n.release(&self.room, session.as_str()));
    }
}

/// [`Provider`] whose transport lives in JavaScript.
///
/// The callbacks stay registered while the provider or any handle it bound
/// is alive.
pub struct JsProvider {
    network: NetworkLease,
}

impl JsProvider {
    pub fn new(callbacks: JsValue) -> Self {
        Self {
            network: NetworkLease::register(callbacks.unchecked_into()),
        }
    }
}

impl Provider for JsProvider {
    fn bind(&self, request: &BindRequest) -> Result<ProviderHandle, CollabError> {
        let engine = Arc::new(JsSyncEngine {
            network: self.network.clone(),
            room: request.room.clone(),
        });
        let handle = ProviderHandle::new(
            request.clone(),
            SessionId::random(),
            DEFAULT_FIELD,
            engine,
        )?;

        let connection = RoomConnection {
            handle: handle.downgrade(),
        };
        let connected = self
            .network
            .with(|n| n.connect(&request.party, &request.room, connection));
        match connected {
            Some(Ok(())) => Ok(handle),
            Some(Err(e)) => Err(CollabError::EngineUnavailable(format!(
                "{}: {}",
                request.room,
                js_error_message(&e)
            ))),
            None => Err(CollabError::EngineUnavailable(request.room.clone())),
        }
    }
}

/// Inbound side of a room connection, driven by the JavaScript transport.
#[wasm_bindgen]
pub struct RoomConnection {
    handle: WeakProviderHandle,
}

impl RoomConnection {
    fn handle(&self) -> Result<ProviderHandle, JsError> {
        self.handle
            .upgrade()
            .ok_or_else(|| JsError::new("session closed"))
    }
}

#[wasm_bindgen]
impl RoomConnection {
    #[wasm_bindgen(getter, js_name = "sessionId")]
    pub fn session_id(&self) -> Option<String> {
        self.handle
            .upgrade()
            .map(|h| h.session_id().as_str().to_string())
    }

    /// Merge a replica delta received from the room.
    #[wasm_bindgen(js_name = "receiveUpdate")]
    pub fn receive_update(&self, update: &[u8]) -> Result<(), JsError> {
        Ok(self.handle()?.merge_remote(update)?)
    }

    /// Apply an awareness update received from the room.
    #[wasm_bindgen(js_name = "receiveAwareness")]
    pub fn receive_awareness(&self, update: &[u8]) -> Result<(), JsError> {
        let update = AwarenessUpdate::decode(update)?;
        self.handle()?.apply_awareness(&update);
        Ok(())
    }

    /// Local awareness to send to a peer that just joined.
    #[wasm_bindgen(js_name = "localAwareness")]
    pub fn local_awareness(&self) -> Result<Option<Vec<u8>>, JsError> {
        match self.handle()?.local_awareness() {
            Some(update) => Ok(Some(update.encode()?)),
            None => Ok(None),
        }
    }

    #[wasm_bindgen(js_name = "stateVector")]
    pub fn state_vector(&self) -> Result<Vec<u8>, JsError> {
        Ok(self.handle()?.replica().state_vector())
    }

    /// What the room with `state_vector` is missing from this replica.
    #[wasm_bindgen(js_name = "encodeDiff")]
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>, JsError> {
        Ok(self.handle()?.replica().encode_diff(state_vector)?)
    }

    /// `"connecting"`, `"connected"` or `"disconnected"`.
    #[wasm_bindgen(js_name = "setStatus")]
    pub fn set_status(&self, status: &str) -> Result<(), JsError> {
        let state = match status {
            "connecting" => ConnectionState::Connecting,
            "connected" => ConnectionState::Connected,
            "disconnected" => ConnectionState::Disconnected,
            other => return Err(JsError::new(&format!("unknown status {other:?}"))),
        };
        self.handle()?.set_status(state);
        Ok(())
    }

    #[wasm_bindgen(js_name = "peerLeft")]
    pub fn peer_left(&self, session: &str) -> Result<(), JsError> {
        self.handle()?.drop_peer(&SessionId::new(session));
        Ok(())
    }
}
