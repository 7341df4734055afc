use thiserror::Error;

/// Errors raised at the seam between the session and the CRDT / sync engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollabError {
    #[error("failed to decode replica update: {0}")]
    Decode(String),

    #[error("failed to merge replica update: {0}")]
    Merge(String),

    #[error("failed to register replica observer: {0}")]
    Observe(String),

    #[error("awareness encoding error: {0}")]
    Awareness(String),

    #[error("sync engine unavailable for room {0}")]
    EngineUnavailable(String),
}
