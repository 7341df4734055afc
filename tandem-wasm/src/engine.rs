//! Bridge to a JavaScript rich-text engine (Tiptap / ProseMirror).
//!
//! ## Usage from JavaScript
//!
//! ```javascript
//! const engine = {
//!   mount(anchor, extensions, options, replica) {
//!     const ydoc = new Y.Doc();
//!     Y.applyUpdate(ydoc, replica.encodeStateAsUpdate());
//!     ydoc.on("update", (u, origin) => origin !== "tandem" && replica.applyLocalUpdate(u));
//!     const editor = new Editor({ element: anchor, extensions: build(extensions, ydoc), ...options });
//!     return {
//!       setCursors(cursors) { overlay.replace(cursors) },
//!       replicaChanged(remote) {
//!         if (remote) Y.applyUpdate(ydoc, replica.encodeDiff(Y.encodeStateVector(ydoc)), "tandem");
//!       },
//!       statusChanged(status) {},
//!       destroy() { editor.destroy() },
//!     };
//!   },
//! };
//! ```

use serde::Serialize;
use tandem_collab::{ConnectionState, SharedReplica, UpdateOrigin};
use tandem_core::{EditorEngine, EditorOptions, EditorSurface, ExtensionConfig, RenderedCursor};
use wasm_bindgen::prelude::*;

use crate::browser::{js_error_message, materialize};

#[wasm_bindgen]
extern "C" {
    /// JavaScript object implementing `mount`.
    #[wasm_bindgen(typescript_type = "EditorEngineCallbacks")]
    pub type EditorEngineCallbacks;

    #[wasm_bindgen(method, catch)]
    fn mount(
        this: &EditorEngineCallbacks,
        anchor: &web_sys::Element,
        extensions: JsValue,
        options: JsValue,
        replica: ReplicaBridge,
    ) -> Result<EditorHandle, JsValue>;

    /// The mounted editor returned by `mount`.
    pub type EditorHandle;

    #[wasm_bindgen(method, js_name = "setCursors")]
    fn set_cursors(this: &EditorHandle, cursors: js_sys::Array);

    #[wasm_bindgen(method, js_name = "replicaChanged")]
    fn replica_changed(this: &EditorHandle, remote: bool);

    #[wasm_bindgen(method, js_name = "statusChanged")]
    fn status_changed(this: &EditorHandle, status: &str);

    #[wasm_bindgen(method)]
    fn destroy(this: &EditorHandle);
}

#[wasm_bindgen(typescript_custom_section)]
const TS_EDITOR_ENGINE: &'static str = r#"
interface RemoteCaret {
    participant: string;
    anchor: number;
    head: number;
    caret: HTMLElement;
}

interface EditorHandle {
    setCursors(cursors: RemoteCaret[]): void;
    replicaChanged(remote: boolean): void;
    statusChanged(status: "connecting" | "connected" | "disconnected"): void;
    destroy(): void;
}

interface EditorEngineCallbacks {
    mount(anchor: HTMLElement, extensions: unknown[], options: unknown, replica: ReplicaBridge): EditorHandle;
}
"#;

/// The replica as seen by the JavaScript engine's own document.
#[wasm_bindgen]
pub struct ReplicaBridge {
    replica: SharedReplica,
}

#[wasm_bindgen]
impl ReplicaBridge {
    #[wasm_bindgen(getter)]
    pub fn field(&self) -> String {
        self.replica.field().to_string()
    }

    /// Forward an update produced by a local edit in the engine.
    #[wasm_bindgen(js_name = "applyLocalUpdate")]
    pub fn apply_local_update(&self, update: &[u8]) -> Result<(), JsError> {
        Ok(self.replica.apply_local_update(update)?)
    }

    #[wasm_bindgen(js_name = "encodeStateAsUpdate")]
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        self.replica.encode_state_as_update()
    }

    #[wasm_bindgen(js_name = "encodeDiff")]
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>, JsError> {
        Ok(self.replica.encode_diff(state_vector)?)
    }
}

/// [`EditorEngine`] backed by JavaScript callbacks.
pub struct JsEditorEngine {
    callbacks: EditorEngineCallbacks,
    document: web_sys::Document,
}

impl JsEditorEngine {
    pub fn new(callbacks: JsValue) -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        Ok(Self {
            callbacks: callbacks.unchecked_into(),
            document,
        })
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| e.to_string())
}

impl EditorEngine for JsEditorEngine {
    type Anchor = web_sys::Element;
    type Surface = JsSurface;

    fn find_anchor(&self, id: &str) -> Option<web_sys::Element> {
        self.document.get_element_by_id(id)
    }

    fn mount(
        &self,
        anchor: web_sys::Element,
        extensions: ExtensionConfig,
        options: &EditorOptions,
    ) -> Result<JsSurface, String> {
        let replica = extensions
            .collaboration()
            .map(|c| c.replica.clone())
            .ok_or_else(|| "collaboration extension missing".to_string())?;
        let handle = self
            .callbacks
            .mount(
                &anchor,
                to_js(&extensions.descriptors())?,
                to_js(options)?,
                ReplicaBridge { replica },
            )
            .map_err(|e| js_error_message(&e))?;
        Ok(JsSurface {
            handle,
            document: self.document.clone(),
        })
    }
}

/// A mounted JavaScript editor.
pub struct JsSurface {
    handle: EditorHandle,
    document: web_sys::Document,
}

impl JsSurface {
    fn caret_object(&self, cursor: &RenderedCursor) -> Result<js_sys::Object, JsValue> {
        let caret = materialize(&self.document, &cursor.caret)?;
        let object = js_sys::Object::new();
        js_sys::Reflect::set(&object, &"participant".into(), &cursor.participant.as_str().into())?;
        js_sys::Reflect::set(&object, &"anchor".into(), &cursor.cursor.anchor.into())?;
        js_sys::Reflect::set(&object, &"head".into(), &cursor.cursor.head.into())?;
        js_sys::Reflect::set(&object, &"caret".into(), &caret)?;
        Ok(object)
    }
}

impl EditorSurface for JsSurface {
    fn update_cursors(&mut self, cursors: Vec<RenderedCursor>) {
        let array = js_sys::Array::new();
        for cursor in &cursors {
            match self.caret_object(cursor) {
                Ok(object) => {
                    array.push(&object);
                }
                Err(e) => log::warn!(
                    "Skipping caret for {}: {}",
                    cursor.participant,
                    js_error_message(&e)
                ),
            }
        }
        self.handle.set_cursors(array);
    }

    fn replica_changed(&mut self, origin: UpdateOrigin) {
        self.handle.replica_changed(origin == UpdateOrigin::Remote);
    }

    fn status_changed(&mut self, status: ConnectionState) {
        self.handle.status_changed(match status {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        });
    }

    fn unmount(&mut self) {
        self.handle.destroy();
    }
}
