//! Placeholder text for empty blocks.
//!
//! Recomputed on every render; the result depends only on the block it is
//! asked about.

use serde::Serialize;

use crate::schema::BlockKind;

/// Text shown in an empty non-heading block.
pub const DEFAULT_PLACEHOLDER: &str = "Start typing...";

/// Read-only view of one top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView {
    pub kind: BlockKind,
    pub child_count: usize,
}

impl NodeView {
    pub fn new(kind: BlockKind, child_count: usize) -> Self {
        Self { kind, child_count }
    }

    pub fn empty(kind: BlockKind) -> Self {
        Self::new(kind, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.child_count == 0 && self.kind != BlockKind::HorizontalRule
    }
}

/// Placeholder for `node`, or `None` when it has content.
pub fn placeholder_text(node: &NodeView) -> Option<String> {
    if node.child_count > 0 {
        return None;
    }
    Some(match node.kind {
        BlockKind::Heading { level } => format!("Heading {level}"),
        _ => DEFAULT_PLACEHOLDER.to_string(),
    })
}

/// Placeholder extension options.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderOptions {
    pub empty_editor_class: String,
    pub empty_node_class: String,
    pub show_only_when_editable: bool,
    pub show_only_current: bool,
    pub include_children: bool,
    #[serde(skip)]
    pub placeholder: fn(&NodeView) -> Option<String>,
}

impl Default for PlaceholderOptions {
    fn default() -> Self {
        Self {
            empty_editor_class: "is-editor-empty".to_string(),
            empty_node_class: "is-empty".to_string(),
            show_only_when_editable: true,
            show_only_current: true,
            include_children: false,
            placeholder: placeholder_text,
        }
    }
}

/// Attributes to add to one empty top-level block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub index: usize,
    pub class: String,
    /// Value of `data-placeholder`.
    pub placeholder: String,
}

impl PlaceholderOptions {
    /// Decorations for the top-level `blocks`.
    ///
    /// `anchor` is the index of the block holding the selection anchor.
    pub fn decorations(
        &self,
        blocks: &[NodeView],
        anchor: Option<usize>,
        editable: bool,
    ) -> Vec<Decoration> {
        if self.show_only_when_editable && !editable {
            return Vec::new();
        }
        let editor_empty = matches!(blocks, [only] if only.is_empty());

        blocks
            .iter()
            .enumerate()
            .filter(|(index, node)| {
                node.is_empty() && (!self.show_only_current || anchor == Some(*index))
            })
            .filter_map(|(index, node)| {
                let text = (self.placeholder)(node)?;
                let mut class = self.empty_node_class.clone();
                if editor_empty {
                    class.push(' ');
                    class.push_str(&self.empty_editor_class);
                }
                Some(Decoration {
                    index,
                    class,
                    placeholder: text,
                })
            })
            .collect()
    }
}
