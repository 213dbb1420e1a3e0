//! Engine configuration (YAML)
//!
//! ```yaml
//! max_nesting_depth: 100
//! log_verbosity: init
//! log_file: /tmp/process.log
//! execution_mode: always
//! omit_null_results: true
//! progress_display_delay_ms: 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};
use crate::logging::LogVerbosity;
use crate::nesting::DEFAULT_MAX_NESTING_DEPTH;

/// Which operators a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Mark every enabled operator dirty and run everything.
    #[default]
    Always,
    /// Keep previous port data and run only operators already dirty.
    OnlyDirty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_nesting_depth: usize,
    /// The process's own verbosity; a run never logs less verbosely than this.
    pub log_verbosity: LogVerbosity,
    pub log_file: Option<PathBuf>,
    pub execution_mode: ExecutionMode,
    pub omit_null_results: bool,
    pub progress_display_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            log_verbosity: LogVerbosity::default(),
            log_file: None,
            execution_mode: ExecutionMode::default(),
            omit_null_results: true,
            progress_display_delay_ms: 5000,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ProcessError::Config {
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ProcessError::Config {
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn progress_display_delay(&self) -> Duration {
        Duration::from_millis(self.progress_display_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_yaml_is_default() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_nesting_depth, 100);
        assert!(config.omit_null_results);
        assert_eq!(config.progress_display_delay(), Duration::from_secs(5));
    }

    #[test]
    fn partial_yaml_overrides_fields() {
        let yaml = r#"
            max_nesting_depth: 3
            execution_mode: only_dirty
            log_verbosity: warning
        "#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_nesting_depth, 3);
        assert_eq!(config.execution_mode, ExecutionMode::OnlyDirty);
        assert_eq!(config.log_verbosity, LogVerbosity::Warning);
        assert!(config.omit_null_results);
    }

    #[test]
    fn unknown_mode_is_config_error() {
        let err = EngineConfig::from_yaml_str("execution_mode: sometimes").unwrap_err();
        assert!(matches!(err, ProcessError::Config { .. }));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        let config = EngineConfig {
            log_file: Some(dir.path().join("run.log")),
            omit_null_results: false,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
