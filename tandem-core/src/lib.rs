//! # tandem-core - Collaborative editor session core
//!
//! Everything between the browser location and a mounted, collaborative
//! editor, independent of any DOM backend.
//!
//! ```text
//!  location ──► room ──► Provider::bind ──► ExtensionComposer ──► EditorEngine::mount
//!                             │                                          │
//!                             └──── ProviderEvent ──► Session ──► cursor ──► surface
//! ```
//!
//! ## Modules
//!
//! - [`room`] - room identity from the location, redirect on first visit
//! - [`palette`] - presence colors
//! - [`extensions`] - ordered editor capability stack
//! - [`placeholder`] - empty-block placeholder text
//! - [`schema`] - `heading block*` document shape
//! - [`cursor`] - remote caret rendering
//! - [`dom`] - backend-independent DOM fragments
//! - [`session`] - boot, event pump and teardown

pub mod config;
pub mod cursor;
pub mod dom;
pub mod error;
pub mod extensions;
pub mod palette;
pub mod placeholder;
pub mod room;
pub mod schema;
pub mod session;

pub use config::SessionConfig;
pub use cursor::{render_remote_cursors, CaretRenderer, CursorRender, RenderedCursor};
pub use dom::{Element, Node};
pub use error::{ConfigError, RoomError, SessionError};
pub use extensions::{EditorOptions, Extension, ExtensionComposer, ExtensionConfig};
pub use palette::{Palette, PresenceColor, SessionPresence, DEFAULT_PALETTE};
pub use placeholder::{placeholder_text, NodeView, PlaceholderOptions};
pub use room::{resolve, IdentitySource, Navigator, RandomIdentity, Resolution, RoomId};
pub use schema::{BlockKind, DocumentShape};
pub use session::{Boot, EditorEngine, EditorSurface, Session, SessionRoot};

pub use tandem_collab as collab;
