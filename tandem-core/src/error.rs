use tandem_collab::CollabError;
use thiserror::Error;

/// Failures while deriving the document identity from the location.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("random identity source unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("failed to redirect to {target}: {reason}")]
    Redirect { target: String, reason: String },
}

/// Invalid session configuration, detected before anything is mounted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("party name must not be empty")]
    EmptyParty,

    #[error("mount target id must not be empty")]
    EmptyMountId,

    #[error("presence palette must contain at least one color")]
    EmptyPalette,

    #[error("invalid presence color: {0:?}")]
    InvalidColor(String),

    #[error("collaboration field name must not be empty")]
    EmptyField,

    #[error("replica binds field {found:?}, expected {expected:?}")]
    FieldMismatch { expected: String, found: String },

    #[error("conflicting history mechanisms: {0}")]
    ConflictingHistory(&'static str),
}

/// Fatal startup or mount failure of an editor session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error("mount target #{0} not found")]
    MissingMountTarget(String),

    #[error("editor engine refused to mount: {0}")]
    Mount(String),
}
