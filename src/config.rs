//! Configuration management for the dictation core.
//!
//! This module handles loading and saving configuration to/from a JSON file
//! in the config directory, and derives the `StoreOptions` handed to the
//! `Database` at construction time.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DictationError, DictationResult};
use crate::models::DEFAULT_FORMATTING_PROFILE;

const CONFIG_FILE_NAME: &str = "config.json";
const DATABASE_FILE_NAME: &str = "transcriptions.db";

/// Suffix appended to the database path to form the backup path
pub const DEFAULT_BACKUP_SUFFIX: &str = ".backup";

fn default_backup_suffix() -> String {
    DEFAULT_BACKUP_SUFFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_formatting_profile() -> String {
    DEFAULT_FORMATTING_PROFILE.to_string()
}

fn default_page_size() -> u32 {
    50
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    /// Path to the database file
    #[serde(default)]
    pub database_file: String,
    /// Suffix of the sibling backup file
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
    /// Take a backup whenever the store is closed
    #[serde(default = "default_true")]
    pub backup_on_close: bool,
    /// Profile recorded on notes inserted without one
    #[serde(default = "default_formatting_profile")]
    pub default_formatting_profile: String,
    /// Page size for callers that do not pass a limit; the store itself
    /// treats a missing limit as unlimited
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            database_file: String::new(),
            backup_suffix: default_backup_suffix(),
            backup_on_close: true,
            default_formatting_profile: default_formatting_profile(),
            default_page_size: default_page_size(),
        }
    }
}

/// Construction-time options for a `Database`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub backup_suffix: String,
    pub backup_on_close: bool,
    pub default_formatting_profile: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            backup_suffix: default_backup_suffix(),
            backup_on_close: true,
            default_formatting_profile: default_formatting_profile(),
        }
    }
}

/// Configuration manager
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager
    ///
    /// Without the `desktop` feature, `config_dir` is required.
    pub fn new(config_dir: Option<PathBuf>) -> DictationResult<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => {
                #[cfg(feature = "desktop")]
                {
                    dirs::data_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("dictation")
                }
                #[cfg(not(feature = "desktop"))]
                {
                    return Err(DictationError::Config(
                        "config_dir is required without the desktop feature".to_string(),
                    ));
                }
            }
        };

        fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join(CONFIG_FILE_NAME);

        let default_data = || {
            let mut default = ConfigData::default();
            default.database_file = config_dir
                .join(DATABASE_FILE_NAME)
                .to_string_lossy()
                .to_string();
            default
        };

        let data = if config_file.exists() {
            match fs::read_to_string(&config_file) {
                Ok(content) => match serde_json::from_str::<ConfigData>(&content) {
                    Ok(mut data) => {
                        if data.database_file.is_empty() {
                            data.database_file = default_data().database_file;
                        }
                        data
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config {:?}: {}", config_file, e);
                        default_data()
                    }
                },
                Err(_) => default_data(),
            }
        } else {
            default_data()
        };

        let config = Self {
            config_dir,
            config_file,
            data,
        };

        // Save default config if it doesn't exist
        if !config.config_file.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> DictationResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the database file path
    pub fn database_file(&self) -> &str {
        &self.data.database_file
    }

    pub fn backup_suffix(&self) -> &str {
        &self.data.backup_suffix
    }

    pub fn backup_on_close(&self) -> bool {
        self.data.backup_on_close
    }

    pub fn set_backup_on_close(&mut self, enabled: bool) -> DictationResult<()> {
        self.data.backup_on_close = enabled;
        self.save()
    }

    pub fn default_formatting_profile(&self) -> &str {
        &self.data.default_formatting_profile
    }

    pub fn set_default_formatting_profile(&mut self, profile: &str) -> DictationResult<()> {
        crate::validation::validate_formatting_profile(profile)?;
        self.data.default_formatting_profile = profile.to_string();
        self.save()
    }

    pub fn default_page_size(&self) -> u32 {
        self.data.default_page_size
    }

    /// Options for opening the store described by this configuration
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            backup_suffix: self.data.backup_suffix.clone(),
            backup_on_close: self.data.backup_on_close,
            default_formatting_profile: self.data.default_formatting_profile.clone(),
        }
    }

    /// Get a config value by key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "database_file" => Some(self.data.database_file.clone()),
            "backup_suffix" => Some(self.data.backup_suffix.clone()),
            "backup_on_close" => Some(self.data.backup_on_close.to_string()),
            "default_formatting_profile" => Some(self.data.default_formatting_profile.clone()),
            "default_page_size" => Some(self.data.default_page_size.to_string()),
            _ => None,
        }
    }

    /// Set a config value by key
    pub fn set(&mut self, key: &str, value: &str) -> DictationResult<()> {
        match key {
            "database_file" => self.data.database_file = value.to_string(),
            "backup_suffix" => {
                if value.is_empty() {
                    return Err(DictationError::validation(
                        "backup_suffix",
                        "cannot be empty",
                    ));
                }
                self.data.backup_suffix = value.to_string();
            }
            "backup_on_close" => {
                self.data.backup_on_close = value.parse().map_err(|_| {
                    DictationError::validation("backup_on_close", "must be true or false")
                })?;
            }
            "default_formatting_profile" => {
                crate::validation::validate_formatting_profile(value)?;
                self.data.default_formatting_profile = value.to_string();
            }
            "default_page_size" => {
                self.data.default_page_size = value
                    .parse::<u32>()
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or_else(|| {
                        DictationError::validation("default_page_size", "must be a positive integer")
                    })?;
            }
            _ => {
                return Err(DictationError::Config(format!("Unknown config key: {}", key)));
            }
        }
        self.save()
    }
}
