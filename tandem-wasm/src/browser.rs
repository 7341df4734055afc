//! Window-backed location and DOM materialisation.

use tandem_core::{Element, Navigator, Node, RoomError};
use wasm_bindgen::prelude::*;

/// `window.location` as a [`Navigator`].
pub struct BrowserNavigator {
    window: web_sys::Window,
}

impl BrowserNavigator {
    pub fn new() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))?;
        Ok(Self { window })
    }
}

impl Navigator for BrowserNavigator {
    fn pathname(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn redirect(&self, target: &str) -> Result<(), RoomError> {
        self.window
            .location()
            .set_href(target)
            .map_err(|e| RoomError::Redirect {
                target: target.to_string(),
                reason: js_error_message(&e),
            })
    }
}

/// Build real DOM for `element`. Text always goes through `createTextNode`.
pub fn materialize(document: &web_sys::Document, element: &Element) -> Result<web_sys::Element, JsValue> {
    let node = document.create_element(element.tag())?;
    for (name, value) in element.attributes() {
        node.set_attribute(name, value)?;
    }
    for child in element.children() {
        match child {
            Node::Element(child) => {
                let child: web_sys::Element = materialize(document, child)?;
                node.append_child(&child)?;
            }
            Node::Text(text) => {
                node.append_child(&document.create_text_node(text))?;
            }
        }
    }
    Ok(node)
}

/// Best-effort message of a thrown JS value.
pub fn js_error_message(err: &JsValue) -> String {
    if let Some(s) = err.as_string() {
        s
    } else if let Some(obj) = err.dyn_ref::<js_sys::Object>() {
        obj.to_string()
            .as_string()
            .unwrap_or_else(|| "Unknown JS error".to_string())
    } else {
        "Unknown JS error".to_string()
    }
}
