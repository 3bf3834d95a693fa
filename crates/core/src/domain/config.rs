//! Configuration management for avolt
//!
//! This module provides:
//! - Configuration structs for the mixer device, sound profiles and the
//!   output toggle group
//! - TOML serialization with validation
//! - A manager that finds the configuration file and falls back to the
//!   factory default

use crate::domain::profile::{ProfileError, ToggleGroup};
use crate::domain::volume::VolumeRepresentation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

impl From<ProfileError> for ConfigError {
    fn from(err: ProfileError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_semaphore_name() -> String {
    "avolt".to_string()
}

fn default_true() -> bool {
    true
}

fn default_volume_type() -> VolumeRepresentation {
    VolumeRepresentation::HardwarePercentage
}

fn default_soft_limit() -> i64 {
    100
}

/// Sound profile configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,

    /// Element whose playback switch marks this profile active
    pub element: String,

    /// Element used for volume control (None = same as `element`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_element: Option<String>,

    /// Default volume, in `volume_type` units
    pub default_volume: i64,

    #[serde(default = "default_volume_type")]
    pub volume_type: VolumeRepresentation,

    /// Volumes above this need confirmation when `confirm_exceeding_limit` is set
    #[serde(default = "default_soft_limit")]
    pub soft_limit_volume: i64,

    /// Apply `default_volume` when the profile is toggled on
    #[serde(default)]
    pub set_default_volume: bool,

    #[serde(default)]
    pub confirm_exceeding_limit: bool,
}

/// Complete avolt configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvoltConfig {
    /// Mixer device to attach to
    #[serde(default = "default_device")]
    pub device: String,

    /// Serialize volume changes of concurrent invocations
    #[serde(default = "default_true")]
    pub use_semaphore: bool,

    #[serde(default = "default_semaphore_name")]
    pub semaphore_name: String,

    /// Element whose playback switch is reported as the front panel state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_panel: Option<String>,

    /// Profile names cycled through by output toggling
    #[serde(default)]
    pub toggle_group: Vec<String>,

    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

impl Default for AvoltConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            use_semaphore: true,
            semaphore_name: default_semaphore_name(),
            front_panel: None,
            toggle_group: Vec::new(),
            profiles: Vec::new(),
        }
    }
}

impl AvoltConfig {
    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str)?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Check cross references between profiles and the toggle group
    pub fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            return Err(ConfigError::Invalid("no sound profiles configured".to_string()));
        }
        if self.semaphore_name.trim().is_empty() {
            return Err(ConfigError::Invalid("semaphore_name is empty".to_string()));
        }
        if matches!(&self.front_panel, Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::Invalid("front_panel is empty".to_string()));
        }

        for (i, profile) in self.profiles.iter().enumerate() {
            if profile.name.trim().is_empty() || profile.element.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "profile #{} needs a name and an element",
                    i + 1
                )));
            }
            if self.profiles[..i]
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(&profile.name))
            {
                return Err(ConfigError::Invalid(format!(
                    "duplicate profile name '{}'",
                    profile.name
                )));
            }
        }

        for member in &self.toggle_group {
            if self.profile(member).is_none() {
                return Err(ConfigError::ProfileNotFound(member.clone()));
            }
        }
        self.toggle_group()?;

        Ok(())
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn toggle_group(&self) -> Result<ToggleGroup> {
        Ok(ToggleGroup::new(self.toggle_group.clone())?)
    }

    /// Create factory default configuration
    ///
    /// Fits the common HD-audio layout: `Master` controls the volume while
    /// `Front` and `Headphone` switch the outputs on and off.
    pub fn factory_default() -> Self {
        let mut config = Self::default();

        config.profiles.push(ProfileConfig {
            name: "master".to_string(),
            element: "Master".to_string(),
            control_element: None,
            default_volume: 32,
            volume_type: VolumeRepresentation::HardwarePercentage,
            soft_limit_volume: 100,
            set_default_volume: false,
            confirm_exceeding_limit: false,
        });

        config.profiles.push(ProfileConfig {
            name: "speakers".to_string(),
            element: "Front".to_string(),
            control_element: Some("Master".to_string()),
            default_volume: 40,
            volume_type: VolumeRepresentation::NormalizedPercentage,
            soft_limit_volume: 80,
            set_default_volume: true,
            confirm_exceeding_limit: false,
        });

        config.profiles.push(ProfileConfig {
            name: "headphones".to_string(),
            element: "Headphone".to_string(),
            control_element: Some("Master".to_string()),
            default_volume: 25,
            volume_type: VolumeRepresentation::NormalizedPercentage,
            soft_limit_volume: 50,
            set_default_volume: true,
            confirm_exceeding_limit: true,
        });

        config.toggle_group = vec!["speakers".to_string(), "headphones".to_string()];
        config
    }
}

/// Configuration manager for the avolt config file
///
/// Manages the configuration file at `~/.config/avolt/config.toml` unless
/// another path is given.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Manager for the default config file location
    pub fn with_default_path() -> Result<Self> {
        Ok(Self::new(Self::default_config_dir()?.join("config.toml")))
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/avolt` (or `$XDG_CONFIG_HOME/avolt`)
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("avolt"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load configuration from file
    ///
    /// A missing file gives the factory default. An unreadable or unparsable
    /// file is logged and also gives the factory default. A file that parses
    /// but contradicts itself is an error.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<AvoltConfig> {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, using factory default"
            );
            return Ok(AvoltConfig::factory_default());
        }

        match AvoltConfig::load_from_file(&self.config_path) {
            Ok(config) => Ok(config),
            Err(e @ (ConfigError::Invalid(_) | ConfigError::ProfileNotFound(_))) => Err(e),
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );
                Ok(AvoltConfig::factory_default())
            }
        }
    }
}
