//! Scheduler configuration, read from the `[scheduler]` table of a TOML file.
//!
//! ```toml
//! [scheduler]
//! poll_interval_ms = 5000
//! max_concurrent_tasks = 4
//! log_dir = "/var/log/tasket"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between two scheduling passes when nobody wakes the loop up.
    pub poll_interval_ms: u64,

    /// Upper bound on tasks running at once. `None` means unbounded.
    pub max_concurrent_tasks: Option<usize>,

    /// Where per-task log files are mirrored, if anywhere.
    pub log_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_concurrent_tasks: None,
            log_dir: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scheduler: SchedulerConfig,
}

impl SchedulerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        file.scheduler.validate()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_tasks == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be greater than 0".to_string(),
            ));
        }
        Ok(self)
    }
}
