//! Editor capability stack.
//!
//! The composer assembles, in order:
//!
//! ```text
//! 1. StarterKit           base formatting, built-in history OFF
//! 2. Document             "heading block*"
//! 3. Placeholder          "Heading {L}" / "Start typing..."
//! 4. Collaboration        replica fragment + CRDT-aware undo
//! 5. CollaborationCursor  provider handle, local user, caret renderer
//! ```
//!
//! Exactly one history mechanism may be active. With the CRDT binding
//! present, the engine's own undo stack would revert collaborators' edits,
//! so the starter kit's history must be off.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tandem_collab::{ProviderHandle, ReplicaHistory, SharedReplica, UserProfile, DEFAULT_FIELD};

use crate::cursor::{CaretRenderer, CursorRender};
use crate::error::ConfigError;
use crate::palette::SessionPresence;
use crate::placeholder::PlaceholderOptions;
use crate::schema::{DocumentShape, HEADING_LEVELS};

/// Surface classes: prose layout plus the placeholder and caret CSS hooks.
pub const EDITOR_CLASS: &str = concat!(
    "prose mx-auto flex h-full min-h-screen w-full max-w-screen-md flex-col p-1 p-4 outline-none sm:p-8 md:p-20 ",
    "[&_.is-editor-empty]:before:pointer-events-none [&_.is-editor-empty]:before:float-left [&_.is-editor-empty]:before:h-0 [&_.is-editor-empty]:before:text-neutral-400 [&_.is-editor-empty]:before:content-[attr(data-placeholder)] ",
    "[&_.yjs-caret]:pointer-events-none [&_.yjs-caret]:relative [&_.yjs-caret]:mx-[-1px] [&_.yjs-caret]:break-normal [&_.yjs-caret]:border-neutral-900 [&_.yjs-caret]:border-x ",
    "[&_.yjs-label]:absolute [&_.yjs-label]:top-[-1.4em] [&_.yjs-label]:left-[-1px] [&_.yjs-label]:select-none [&_.yjs-label]:whitespace-nowrap [&_.yjs-label]:rounded-sm [&_.yjs-label]:p-0.5 [&_.yjs-label]:font-semibold [&_.yjs-label]:text-neutral-900 [&_.yjs-label]:text-xs",
);

// ───────────────────────────────────────────────────────────────────
// Extensions
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarterKitOptions {
    /// The engine's built-in undo/redo.
    pub history: bool,
    pub heading_levels: Vec<u8>,
}

impl Default for StarterKitOptions {
    fn default() -> Self {
        Self {
            history: false,
            heading_levels: HEADING_LEVELS.collect(),
        }
    }
}

#[derive(Clone)]
pub struct CollaborationOptions {
    pub replica: SharedReplica,
    pub field: String,
}

#[derive(Clone)]
pub struct CursorOptions {
    pub provider: ProviderHandle,
    pub user: UserProfile,
    pub renderer: Arc<dyn CursorRender>,
}

/// One capability handed to the editing engine.
#[derive(Clone)]
pub enum Extension {
    StarterKit(StarterKitOptions),
    Document(DocumentShape),
    Placeholder(PlaceholderOptions),
    Collaboration(CollaborationOptions),
    CollaborationCursor(CursorOptions),
}

impl Extension {
    pub fn name(&self) -> &'static str {
        match self {
            Extension::StarterKit(_) => "starterKit",
            Extension::Document(_) => "document",
            Extension::Placeholder(_) => "placeholder",
            Extension::Collaboration(_) => "collaboration",
            Extension::CollaborationCursor(_) => "collaborationCursor",
        }
    }

    /// Whether this extension brings its own undo/redo.
    pub fn provides_history(&self) -> bool {
        match self {
            Extension::StarterKit(options) => options.history,
            Extension::Collaboration(_) => true,
            _ => false,
        }
    }

    /// JSON descriptor for a JavaScript engine. Callbacks and handles are left out.
    pub fn descriptor(&self) -> Value {
        let options = match self {
            Extension::StarterKit(options) => json!(options),
            Extension::Document(shape) => json!(shape),
            Extension::Placeholder(options) => json!(options),
            Extension::Collaboration(options) => json!({ "field": options.field }),
            Extension::CollaborationCursor(options) => json!({ "user": options.user }),
        };
        json!({ "name": self.name(), "options": options })
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Extension").field(&self.descriptor()).finish()
    }
}

/// Ordered, validated extension list.
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    extensions: Vec<Extension>,
}

impl ExtensionConfig {
    /// Wrap `extensions`, rejecting conflicting history mechanisms.
    pub fn new(extensions: Vec<Extension>) -> Result<Self, ConfigError> {
        let config = Self { extensions };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let collaboration = self.collaboration().is_some();
        let starter_history = self
            .extensions
            .iter()
            .any(|e| matches!(e, Extension::StarterKit(o) if o.history));
        if collaboration && starter_history {
            return Err(ConfigError::ConflictingHistory(
                "built-in history enabled alongside collaboration",
            ));
        }
        if self.extensions.iter().filter(|e| e.provides_history()).count() > 1 {
            return Err(ConfigError::ConflictingHistory("more than one history provider"));
        }
        if let Some(options) = self.collaboration() {
            if options.field.trim().is_empty() {
                return Err(ConfigError::EmptyField);
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.extensions.iter()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(Extension::name).collect()
    }

    pub fn starter_kit(&self) -> Option<&StarterKitOptions> {
        self.extensions.iter().find_map(|e| match e {
            Extension::StarterKit(options) => Some(options),
            _ => None,
        })
    }

    pub fn placeholder(&self) -> Option<&PlaceholderOptions> {
        self.extensions.iter().find_map(|e| match e {
            Extension::Placeholder(options) => Some(options),
            _ => None,
        })
    }

    pub fn collaboration(&self) -> Option<&CollaborationOptions> {
        self.extensions.iter().find_map(|e| match e {
            Extension::Collaboration(options) => Some(options),
            _ => None,
        })
    }

    pub fn cursor(&self) -> Option<&CursorOptions> {
        self.extensions.iter().find_map(|e| match e {
            Extension::CollaborationCursor(options) => Some(options),
            _ => None,
        })
    }

    /// Undo/redo backed by the replica, if collaboration is bound.
    pub fn history(&self) -> Option<ReplicaHistory> {
        self.collaboration().map(|options| options.replica.history())
    }

    /// Descriptors of every extension, in order.
    pub fn descriptors(&self) -> Value {
        Value::Array(self.extensions.iter().map(Extension::descriptor).collect())
    }
}

// ───────────────────────────────────────────────────────────────────
// Composer
// ───────────────────────────────────────────────────────────────────

/// Builds the extension stack for a provider handle.
#[derive(Clone)]
pub struct ExtensionComposer {
    presence: SessionPresence,
    renderer: Arc<dyn CursorRender>,
    placeholder: PlaceholderOptions,
    field: String,
}

impl ExtensionComposer {
    /// Create a composer using the caret renderer and default placeholder.
    pub fn new(presence: SessionPresence) -> Self {
        Self {
            presence,
            renderer: Arc::new(CaretRenderer),
            placeholder: PlaceholderOptions::default(),
            field: DEFAULT_FIELD.to_string(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn CursorRender>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_placeholder(mut self, placeholder: PlaceholderOptions) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn presence(&self) -> &SessionPresence {
        &self.presence
    }

    pub fn compose(&self, provider: &ProviderHandle) -> Result<ExtensionConfig, ConfigError> {
        let replica = provider.replica();
        if replica.field() != self.field {
            return Err(ConfigError::FieldMismatch {
                expected: self.field.clone(),
                found: replica.field().to_string(),
            });
        }

        let user = UserProfile::new(
            provider.session_id().as_str(),
            self.presence.color().as_str(),
        );

        let config = ExtensionConfig::new(vec![
            Extension::StarterKit(StarterKitOptions::default()),
            Extension::Document(DocumentShape::default()),
            Extension::Placeholder(self.placeholder.clone()),
            Extension::Collaboration(CollaborationOptions {
                replica: replica.clone(),
                field: self.field.clone(),
            }),
            Extension::CollaborationCursor(CursorOptions {
                provider: provider.clone(),
                user,
                renderer: Arc::clone(&self.renderer),
            }),
        ])?;
        log::debug!("Composed extensions {:?}", config.names());
        Ok(config)
    }
}

/// Options for the mounted editor surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorOptions {
    pub autofocus: bool,
    pub editable: bool,
    /// Attribute class string of the editable surface.
    pub class: String,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            autofocus: true,
            editable: true,
            class: EDITOR_CLASS.to_string(),
        }
    }
}
