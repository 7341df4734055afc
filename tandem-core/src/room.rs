//! Room identity derived from the navigable location.
//!
//! ```text
//! pathname "/"     ──► mint "/{v4}" ──► redirect there ──► Created
//! pathname "/{id}" ─────────────────────────────────────► Existing("/{id}")
//! ```
//!
//! The identity is the whole pathname, leading slash included, so every
//! client on the same address joins the same room.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::RoomError;

/// Pathname naming one shared document. Never empty and never `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// `None` for the root, which asks for a new room.
    pub fn from_path(pathname: &str) -> Option<Self> {
        match pathname {
            "" | "/" => None,
            path => Some(Self(path.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh room identities.
pub trait IdentitySource {
    fn mint(&self) -> Result<RoomId, RoomError>;
}

/// Random v4 UUIDs from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdentity;

impl IdentitySource for RandomIdentity {
    fn mint(&self) -> Result<RoomId, RoomError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| RoomError::IdentityUnavailable(e.to_string()))?;
        let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(RoomId(format!("/{}", id.hyphenated())))
    }
}

/// Read access to, and navigation of, the current location.
pub trait Navigator {
    fn pathname(&self) -> String;

    /// Navigate to `target`. The current page is expected to be replaced.
    fn redirect(&self, target: &str) -> Result<(), RoomError>;
}

/// Outcome of resolving the current location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The location already names a room.
    Existing(RoomId),
    /// A room was minted and navigation to `redirect` started.
    Created { room: RoomId, redirect: String },
}

impl Resolution {
    pub fn room(&self) -> &RoomId {
        match self {
            Resolution::Existing(room) | Resolution::Created { room, .. } => room,
        }
    }
}

/// Resolve the room for the current location, redirecting from the root.
pub fn resolve<N, I>(navigator: &N, identities: &I) -> Result<Resolution, RoomError>
where
    N: Navigator + ?Sized,
    I: IdentitySource + ?Sized,
{
    let pathname = navigator.pathname();
    if let Some(room) = RoomId::from_path(&pathname) {
        log::debug!("Joining existing room {}", room);
        return Ok(Resolution::Existing(room));
    }

    let room = identities.mint()?;
    let redirect = room.as_str().to_string();
    log::info!("Created room {}, redirecting", room);
    navigator.redirect(&redirect)?;
    Ok(Resolution::Created { room, redirect })
}
