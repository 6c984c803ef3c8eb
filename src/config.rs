//! Settings file and batch tuning knobs.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [paths]
//! mark_file = "mark.dat"
//! encoding = "gbk"
//! backup_db = "backups.db"
//!
//! [backup]
//! max_backups = 30
//!
//! [batch]
//! chunk_size = 5
//! success_threshold = 100.0
//! auto_rollback = true
//! continue_on_failure = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Chunking and commit policy for [`crate::engine::BatchEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Requests per chunk, 1..=100.
    pub chunk_size: usize,
    /// Minimum chunk success rate, in percent, required to commit.
    pub success_threshold: f64,
    /// Restore the pre-chunk snapshot when a chunk misses the threshold.
    pub auto_rollback: bool,
    /// Keep processing after a chunk does not commit.
    pub continue_on_failure: bool,
}

impl BatchConfig {
    pub const MAX_CHUNK_SIZE: usize = 100;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=Self::MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::invalid(
                "batch.chunk_size",
                format!("{} is outside 1..={}", self.chunk_size, Self::MAX_CHUNK_SIZE),
            ));
        }
        // NaN fails the range check.
        if !(0.0..=100.0).contains(&self.success_threshold) {
            return Err(ConfigError::invalid(
                "batch.success_threshold",
                format!("{} is outside 0..=100", self.success_threshold),
            ));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            success_threshold: 100.0,
            auto_rollback: true,
            continue_on_failure: true,
        }
    }
}

/// Byte encoding of the mark file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    /// Files written by the desktop client.
    #[default]
    Gbk,
    Utf8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// The sectioned mark file.
    pub mark_file: PathBuf,
    /// Encoding used when writing; reads also accept valid UTF-8.
    pub encoding: FileEncoding,
    /// SQLite snapshot history; snapshots stay in memory when unset.
    pub backup_db: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            mark_file: PathBuf::from("mark.dat"),
            encoding: FileEncoding::Gbk,
            backup_db: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Snapshot rows kept in the history database.
    pub max_backups: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self { max_backups: 30 }
    }
}

/// Limits used by [`crate::validate::RuleValidator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_tip_len: usize,
    pub max_token_len: usize,
    pub max_color_len: usize,
    pub max_time_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_tip_len: 500,
            max_token_len: 32,
            max_color_len: 16,
            max_time_len: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum materialized views kept.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub backup: BackupSettings,
    pub validation: ValidationConfig,
    pub cache: CacheSettings,
    pub batch: BatchConfig,
}

impl Settings {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;
        if self.cache.capacity == 0 {
            return Err(ConfigError::invalid("cache.capacity", "must be at least 1"));
        }
        if self.backup.max_backups == 0 {
            return Err(ConfigError::invalid("backup.max_backups", "must be at least 1"));
        }
        let limits = &self.validation;
        for (field, value) in [
            ("validation.max_tip_len", limits.max_tip_len),
            ("validation.max_token_len", limits.max_token_len),
            ("validation.max_color_len", limits.max_color_len),
            ("validation.max_time_len", limits.max_time_len),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be at least 1"));
            }
        }
        Ok(())
    }
}
