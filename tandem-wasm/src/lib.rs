//! WebAssembly bindings for the Tandem collaborative editor.
//!
//! `start` runs the whole session boot in the page: resolve the room from
//! `window.location`, connect through the JavaScript network provider,
//! compose the extension stack and mount the JavaScript editing engine into
//! `#root`.
//!
//! ```javascript
//! import init, { start } from "./pkg/tandem_wasm.js";
//! await init();
//! const session = start(engine, network);       // undefined after a redirect
//! if (session) requestAnimationFrame(function tick() {
//!   session.pump();
//!   requestAnimationFrame(tick);
//! });
//! ```

pub mod browser;
pub mod engine;
pub mod network;

use tandem_collab::CursorRange;
use tandem_core::{Boot, RandomIdentity, Session, SessionConfig, SessionRoot};
use wasm_bindgen::prelude::*;

use crate::browser::BrowserNavigator;
use crate::engine::{JsEditorEngine, JsSurface};
use crate::network::JsProvider;

// ============================================================================
// Initialization
// ============================================================================

#[cfg(feature = "console_error_panic_hook")]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Initialize the WASM module. Called automatically on module load.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    set_panic_hook();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn js_error<E: std::error::Error>(err: E) -> JsValue {
    JsError::new(&err.to_string()).into()
}

// ============================================================================
// Session
// ============================================================================

/// Boot an editor session for the current page.
///
/// `config` is an optional partial `SessionConfig`. Returns `undefined` when
/// the page was redirected to a freshly created room.
#[wasm_bindgen]
pub fn start(engine: JsValue, network: JsValue, config: JsValue) -> Result<JsValue, JsValue> {
    let config: SessionConfig = if config.is_undefined() || config.is_null() {
        SessionConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)?
    };

    let root = SessionRoot::new(config).map_err(js_error)?;
    let navigator = BrowserNavigator::new()?;
    let engine = JsEditorEngine::new(engine)?;
    let provider = JsProvider::new(network);

    match root
        .boot(&navigator, &RandomIdentity, &provider, &engine)
        .map_err(js_error)?
    {
        Boot::Redirected { redirect, .. } => {
            log::info!("Redirecting to {}", redirect);
            Ok(JsValue::UNDEFINED)
        }
        Boot::Mounted(session) => Ok(EditorSession { inner: session }.into()),
    }
}

/// A mounted editor session.
#[wasm_bindgen]
pub struct EditorSession {
    inner: Session<JsSurface>,
}

#[wasm_bindgen]
impl EditorSession {
    #[wasm_bindgen(getter, js_name = "roomId")]
    pub fn room_id(&self) -> String {
        self.inner.room().to_string()
    }

    #[wasm_bindgen(getter, js_name = "sessionId")]
    pub fn session_id(&self) -> String {
        self.inner.handle().session_id().to_string()
    }

    /// Deliver pending provider events to the editor.
    pub fn pump(&mut self) -> usize {
        self.inner.pump()
    }

    /// Publish the local selection.
    #[wasm_bindgen(js_name = "setCursor")]
    pub fn set_cursor(&self, anchor: u32, head: u32) {
        self.inner.set_cursor(Some(CursorRange::new(anchor, head)));
    }

    #[wasm_bindgen(js_name = "clearCursor")]
    pub fn clear_cursor(&self) {
        self.inner.set_cursor(None);
    }

    pub fn undo(&mut self) -> bool {
        self.inner.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.inner.redo()
    }

    /// Drop remote carets of participants that went quiet. Returns how many.
    #[wasm_bindgen(js_name = "sweepIdle")]
    pub fn sweep_idle(&self) -> usize {
        self.inner.handle().sweep_idle().removed.len()
    }

    /// Unmount the editor and leave the room.
    pub fn teardown(&mut self) {
        self.inner.teardown();
    }
}
