//! Document shape: a leading heading followed by any blocks.
//!
//! The editing engine enforces the content expression through its schema.
//! `DocumentShape::accepts` mirrors it for tests and diagnostics.

use serde::{Deserialize, Serialize};

/// Content expression of the top-level document node.
pub const DOCUMENT_CONTENT: &str = "heading block*";

/// Heading levels the base formatting kit allows.
pub const HEADING_LEVELS: std::ops::RangeInclusive<u8> = 1..=6;

/// Top-level block node kinds produced by the base formatting kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    BulletList,
    OrderedList,
    Blockquote,
    CodeBlock,
    HorizontalRule,
}

impl BlockKind {
    /// Engine node name.
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Heading { .. } => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::BulletList => "bulletList",
            BlockKind::OrderedList => "orderedList",
            BlockKind::Blockquote => "blockquote",
            BlockKind::CodeBlock => "codeBlock",
            BlockKind::HorizontalRule => "horizontalRule",
        }
    }

    /// Parse an engine node name; headings take `level` (clamped to 1..=6).
    pub fn from_name(name: &str, level: Option<u8>) -> Option<Self> {
        Some(match name {
            "heading" => BlockKind::Heading {
                level: level
                    .unwrap_or(1)
                    .clamp(*HEADING_LEVELS.start(), *HEADING_LEVELS.end()),
            },
            "paragraph" => BlockKind::Paragraph,
            "bulletList" => BlockKind::BulletList,
            "orderedList" => BlockKind::OrderedList,
            "blockquote" => BlockKind::Blockquote,
            "codeBlock" => BlockKind::CodeBlock,
            "horizontalRule" => BlockKind::HorizontalRule,
            _ => return None,
        })
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            BlockKind::Heading { level } => Some(*level),
            _ => None,
        }
    }
}

/// The document's top-level content constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentShape {
    pub content: &'static str,
}

impl Default for DocumentShape {
    fn default() -> Self {
        Self {
            content: DOCUMENT_CONTENT,
        }
    }
}

impl DocumentShape {
    /// Whether a sequence of top-level blocks satisfies `heading block*`.
    pub fn accepts(&self, blocks: &[BlockKind]) -> bool {
        matches!(blocks.first(), Some(BlockKind::Heading { .. }))
    }
}
