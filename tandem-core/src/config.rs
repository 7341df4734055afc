use serde::Deserialize;
use tandem_collab::{DEFAULT_FIELD, DEFAULT_PARTY};

use crate::error::ConfigError;
use crate::palette::{Palette, DEFAULT_PALETTE};

/// Session configuration.
///
/// Every field has a default; the browser passes a partial JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Provider channel namespace
    pub party: String,
    /// Id of the element the editor mounts into
    pub mount_id: String,
    /// Presence colors to choose from
    pub palette: Vec<String>,
    /// Replica XML fragment the editing engine binds to
    pub field: String,
    /// Focus the editor once mounted
    pub autofocus: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            party: DEFAULT_PARTY.to_string(),
            mount_id: "root".to_string(),
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            field: DEFAULT_FIELD.to_string(),
            autofocus: true,
        }
    }
}

impl SessionConfig {
    /// Check the configuration and build the validated palette.
    pub fn validate(&self) -> Result<Palette, ConfigError> {
        if self.party.trim().is_empty() {
            return Err(ConfigError::EmptyParty);
        }
        if self.mount_id.trim().is_empty() {
            return Err(ConfigError::EmptyMountId);
        }
        if self.field.trim().is_empty() {
            return Err(ConfigError::EmptyField);
        }
        Palette::from_tokens(&self.palette)
    }
}
