use std::time::Duration;

use serde::Deserialize;

use crate::errors::RoomError;

/// Tunables for a room session. Every field has a default, so hosts only
/// pass what they want to change.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// Label shown on the local participant's tile.
    #[serde(default = "default_local_label")]
    pub local_participant_label: String,
    /// Leave the room when the last remote participant has left.
    #[serde(default = "default_true")]
    pub leave_when_alone: bool,
}

fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_local_label() -> String {
    "You".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: default_stats_interval_ms(),
            local_participant_label: default_local_label(),
            leave_when_alone: true,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, RoomError> {
        let config: Self = serde_json::from_str(json).map_err(|e| RoomError::Config(e.to_string()))?;
        if config.stats_interval_ms == 0 {
            return Err(RoomError::Config("stats_interval_ms must be positive".into()));
        }
        Ok(config)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1))
    }
}
