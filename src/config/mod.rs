//! # Configuration System
//!
//! Environment-aware configuration for the task core and its file/data
//! collaborators. Everything has an explicit validated default; a YAML file
//! and `SHEETMERGE_`-prefixed environment variables override it.
//!
//! ```rust,no_run
//! use sheetmerge_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let cap = manager.config().scheduler.max_workers;
//! let timeout = manager.config().scheduler.task_timeout();
//! # Ok(())
//! # }
//! ```

pub mod loader;

pub use loader::ConfigManager;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SheetmergeConfig {
    /// Worker pool and task lifecycle settings
    pub scheduler: SchedulerConfig,

    /// Upload/result storage settings
    pub files: FileStorageConfig,

    /// Lifecycle event channel settings
    pub events: EventsConfig,
}

impl SheetmergeConfig {
    /// Validate cross-field constraints after loading
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_workers == 0 {
            return Err(CoreError::Configuration {
                message: "scheduler.max_workers must be at least 1".to_string(),
            });
        }
        if self.scheduler.task_timeout_seconds == 0 {
            return Err(CoreError::Configuration {
                message: "scheduler.task_timeout_seconds must be at least 1".to_string(),
            });
        }
        if self.files.max_preview_rows == 0 {
            return Err(CoreError::Configuration {
                message: "files.max_preview_rows must be at least 1".to_string(),
            });
        }
        if self.files.allowed_extensions.is_empty() {
            return Err(CoreError::Configuration {
                message: "files.allowed_extensions must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Worker pool, timeout, and retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of simultaneously running tasks
    pub max_workers: usize,
    /// Per-task wall-clock budget, measured from dispatch
    pub task_timeout_seconds: u64,
    /// How long terminal task records are retained before the purge sweep
    /// removes them
    pub task_retention_hours: u32,
    /// Interval between purge sweeps
    pub purge_interval_seconds: u64,
}

impl SchedulerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }

    pub fn task_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.task_retention_hours))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            task_timeout_seconds: 3600,
            task_retention_hours: 24,
            purge_interval_seconds: 600,
        }
    }
}

/// Upload and result storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileStorageConfig {
    /// Directory for uploaded source files
    pub upload_dir: PathBuf,
    /// Directory for exported result files
    pub results_dir: PathBuf,
    /// Lowercase extensions accepted at upload
    pub allowed_extensions: Vec<String>,
    /// Per-file upload size limit in bytes
    pub max_file_size_bytes: u64,
    /// Hard cap on rows returned by a single preview page
    pub max_preview_rows: usize,
    /// How long uploaded/result files are retained
    pub file_retention_days: u32,
}

impl FileStorageConfig {
    pub fn file_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.file_retention_days))
    }

    pub fn extension_allowed(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == extension)
    }
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            results_dir: PathBuf::from("results"),
            allowed_extensions: vec!["csv".to_string(), "tsv".to_string(), "txt".to_string()],
            max_file_size_bytes: 100 * 1024 * 1024,
            max_preview_rows: 200,
            file_retention_days: 1,
        }
    }
}

/// Lifecycle event broadcast configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers lag past this depth
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}
