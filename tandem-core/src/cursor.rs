//! Remote cursor rendering.
//!
//! ```text
//! ParticipantPresence { name: "Ada", color: "#FFD700" }
//!        │
//!        ▼ CaretRenderer::render
//! <span class="yjs-caret" style="border-color: #FFD700">
//!   <div class="yjs-label" style="background-color: #FFD700">Ada</div>
//! </span>
//! ```
//!
//! The engine positions the returned fragment at the participant's cursor.
//! A malformed presence degrades the fragment; it never fails the render.

use tandem_collab::{CursorRange, ParticipantPresence, SessionId};

use crate::dom::{Element, Node};
use crate::palette::is_css_color;

pub const CARET_CLASS: &str = "yjs-caret";
pub const LABEL_CLASS: &str = "yjs-label";

/// Builds the DOM fragment shown at a remote participant's cursor.
pub trait CursorRender: Send + Sync {
    /// Fresh fragment for `participant`. Must be pure.
    fn render(&self, participant: &ParticipantPresence) -> Element;
}

/// Caret with a name label in the participant's color.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaretRenderer;

impl CursorRender for CaretRenderer {
    fn render(&self, participant: &ParticipantPresence) -> Element {
        let color = participant
            .color
            .as_deref()
            .map(str::trim)
            .filter(|c| is_css_color(c));
        let name = participant.display_name.clone().unwrap_or_default();

        let mut label = Element::new("div").with_class(LABEL_CLASS);
        let mut caret = Element::new("span").with_class(CARET_CLASS);
        if let Some(color) = color {
            label.set_attr("style", format!("background-color: {color}"));
            caret.set_attr("style", format!("border-color: {color}"));
        }
        caret.with_child(label.with_child(Node::text(name)))
    }
}

/// A rendered caret, ready to be placed at `cursor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCursor {
    pub participant: SessionId,
    pub cursor: CursorRange,
    pub caret: Element,
}

/// Render every remote participant that has a cursor, sorted by id.
///
/// The local session is skipped even if it shows up among `participants`.
pub fn render_remote_cursors<R: CursorRender + ?Sized>(
    renderer: &R,
    local: &SessionId,
    participants: &[ParticipantPresence],
) -> Vec<RenderedCursor> {
    let mut rendered: Vec<RenderedCursor> = participants
        .iter()
        .filter(|p| &p.id != local)
        .filter_map(|p| {
            Some(RenderedCursor {
                participant: p.id.clone(),
                cursor: p.cursor?,
                caret: renderer.render(p),
            })
        })
        .collect();
    rendered.sort_by(|a, b| a.participant.cmp(&b.participant));
    rendered
}
