//! Runtime configuration loaded from JSON.
//!
//! Every field has a default, so an empty object (or no file at all) gives
//! the same limits the PaintFE script editor uses.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 50_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 10_000,
            max_array_size: 10_000,
            max_map_size: 1_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryLimits {
    pub max_steps: usize,
    /// `None` disables the memory cap.
    pub max_memory_bytes: Option<usize>,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_memory_bytes: Some(100 * 1024 * 1024),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub sandbox: SandboxLimits,
    pub history: HistoryLimits,
    /// Maximum iterator advances per script run; `None` is unbounded.
    pub step_budget: Option<u64>,
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_gives_defaults() {
        let cfg = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(cfg.sandbox.max_operations, 50_000_000);
        assert_eq!(cfg.history.max_steps, 50);
        assert_eq!(cfg.step_budget, None);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = BridgeConfig::from_json(r#"{"sandbox":{"max_call_levels":8},"step_budget":1000}"#)
            .unwrap();
        assert_eq!(cfg.sandbox.max_call_levels, 8);
        assert_eq!(cfg.sandbox.max_array_size, 10_000);
        assert_eq!(cfg.step_budget, Some(1000));
    }

    #[test]
    fn load_reports_path_on_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = BridgeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = file.path().with_extension("missing");
        assert!(matches!(BridgeConfig::load(&missing), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_reads_history_limits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"history":{{"max_steps":3,"max_memory_bytes":null}}}}"#).unwrap();
        let cfg = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.history.max_steps, 3);
        assert_eq!(cfg.history.max_memory_bytes, None);
    }
}
