//! Persisted pipeline state: rate window + circuit breaker.
//!
//! One small JSON file surviving restarts, so a restart cannot bypass call
//! budgets or a tripped breaker. Load/save is an explicit boundary here;
//! no component does its own scattered file I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

/// Sliding call window for the rate governor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateWindow {
    /// Timestamps of governed calls within the day window.
    pub recent: Vec<DateTime<Utc>>,
    pub last_call: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub backoff_until: Option<DateTime<Utc>>,
}

/// Circuit breaker state for the generation dependency.
///
/// Independent lifecycle from [`RateWindow`]: the governor budgets the
/// content fetches, the breaker gates the generation calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
}

/// Everything that must survive a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub rate: RateWindow,
    #[serde(default)]
    pub circuit: CircuitState,
}

/// Owns the state file path. The single load/save boundary.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load persisted state, or defaults if the file is absent or unreadable.
    ///
    /// An unreadable file is logged and treated as empty rather than fatal:
    /// losing the window is safer than refusing to start.
    pub fn load(&self) -> PersistedState {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), "corrupt state file, starting fresh: {e}");
                PersistedState::default()
            }),
            Err(_) => PersistedState::default(),
        }
    }

    /// Write the state file atomically (temp file + rename).
    pub fn save(&self, state: &PersistedState) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| crate::error::Error::Other(format!("serialize state: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
