//! Service configuration, loadable from `config.json` in the data
//! directory with sensible defaults for every field.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_KOMI, INITIAL_SEARCH_RANGE, MAX_SEARCH_RANGE, OFFER_TTL_SECS, QUEUE_EVICTION_SECS,
    RANGE_EXPAND_INTERVAL_SECS, RANKED_BOARD_SIZE, SEARCH_RANGE_STEP,
};
use crate::store::{data_dir, SnapshotStore};

/// Matchmaking tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    pub initial_range: i32,
    pub range_step: i32,
    pub max_range: i32,
    pub expand_interval_secs: u64,
    pub offer_ttl_secs: u64,
    pub eviction_secs: u64,
    pub ranked_board_size: usize,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            initial_range: INITIAL_SEARCH_RANGE,
            range_step: SEARCH_RANGE_STEP,
            max_range: MAX_SEARCH_RANGE,
            expand_interval_secs: RANGE_EXPAND_INTERVAL_SECS,
            offer_ttl_secs: OFFER_TTL_SECS,
            eviction_secs: QUEUE_EVICTION_SECS,
            ranked_board_size: RANKED_BOARD_SIZE,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Where snapshots and config live; `None` means `~/.goban/`.
    pub data_dir: Option<PathBuf>,
    pub komi: f64,
    pub matchmaking: MatchmakingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            komi: DEFAULT_KOMI,
            matchmaking: MatchmakingConfig::default(),
        }
    }
}

const CONFIG_KEY: &str = "config";

impl ServiceConfig {
    /// Load configuration from a snapshot store, falling back to defaults
    /// when the document is missing or unreadable.
    pub fn load_from(store: &dyn SnapshotStore) -> Self {
        match store.get(CONFIG_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Resolve the effective data directory.
    pub fn resolved_data_dir(&self) -> std::io::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(dir.clone())
            }
            None => data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshotStore;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.komi, 7.5);
        assert_eq!(config.matchmaking.initial_range, 100);
        assert_eq!(config.matchmaking.max_range, 300);
        assert_eq!(config.matchmaking.ranked_board_size, 19);
    }

    #[test]
    fn test_load_missing_falls_back_to_defaults() {
        let store = MemorySnapshotStore::new();
        assert_eq!(ServiceConfig::load_from(&store), ServiceConfig::default());
    }

    #[test]
    fn test_load_partial_document() {
        let store = MemorySnapshotStore::new();
        store
            .put("config", r#"{"komi": 6.5, "matchmaking": {"max_range": 400}}"#)
            .unwrap();
        let config = ServiceConfig::load_from(&store);
        assert_eq!(config.komi, 6.5);
        assert_eq!(config.matchmaking.max_range, 400);
        // Unspecified fields keep their defaults.
        assert_eq!(config.matchmaking.initial_range, 100);
    }
}
