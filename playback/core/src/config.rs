//! TOML Configuration File Support
//!
//! Loads controller timing, clip file names and the castoff passphrase from
//! `~/.config/p69real/playback.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/p69real/playback.toml` (typically `~/.config/p69real/playback.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [timing]
//! idle_timeout_ms = 3000
//! ready_timeout_ms = 5000
//! settle_delay_ms = 50
//! one_shot_timeout_ms = 60000
//!
//! [clips]
//! base_dir = "/videos"
//!
//! [clips.normal]
//! idle = "通常.mp4"
//! transition_reply = "チェンジ.mp4"
//!
//! [clips.armored]
//! transition_reply = "キャストオフ.mp4"
//!
//! [commands]
//! castoff_passphrase = "214200"
//! ```
//!
//! # Environment Variables
//!
//! - `PLAYBACK_IDLE_TIMEOUT_MS`
//! - `PLAYBACK_READY_TIMEOUT_MS`
//! - `PLAYBACK_SETTLE_DELAY_MS`
//! - `PLAYBACK_ONE_SHOT_TIMEOUT_MS`
//! - `PLAYBACK_CLIP_BASE_DIR`
//! - `PLAYBACK_CASTOFF_PASSPHRASE`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clips::{ClipFiles, ClipSet};
use crate::controller::ControllerConfig;
use crate::crossfade::CrossfadeTiming;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[timing]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingToml {
    /// Inactivity before an idle action, in milliseconds
    pub idle_timeout_ms: Option<u64>,
    /// Longest wait for a preload to become ready, in milliseconds
    pub ready_timeout_ms: Option<u64>,
    /// Pause before the visible swap, in milliseconds
    pub settle_delay_ms: Option<u64>,
    /// Longest wait for a one-shot clip to end, in milliseconds
    pub one_shot_timeout_ms: Option<u64>,
}

/// Per-mode `[clips.<mode>]` table; unset roles keep their defaults
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipFilesToml {
    /// Looping idle clip
    pub idle: Option<String>,
    /// Looping speaking clip
    pub speaking: Option<String>,
    /// First idle action
    pub idle_action_1: Option<String>,
    /// Second idle action
    pub idle_action_2: Option<String>,
    /// Reply played when leaving this mode
    pub transition_reply: Option<String>,
}

impl ClipFilesToml {
    fn apply(&self, files: &mut ClipFiles) {
        let fields = [
            (&self.idle, &mut files.idle),
            (&self.speaking, &mut files.speaking),
            (&self.idle_action_1, &mut files.idle_action_1),
            (&self.idle_action_2, &mut files.idle_action_2),
            (&self.transition_reply, &mut files.transition_reply),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
    }
}

/// `[clips]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipsToml {
    /// Directory holding the `normal/` and `armor/` clip folders
    pub base_dir: Option<String>,
    /// Normal skin file names
    pub normal: ClipFilesToml,
    /// Armored skin file names
    pub armored: ClipFilesToml,
}

/// `[commands]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsToml {
    /// Passphrase required to leave the armored skin
    pub castoff_passphrase: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackToml {
    /// Timing section
    pub timing: TimingToml,
    /// Clip section
    pub clips: ClipsToml,
    /// Command section
    pub commands: CommandsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Effective playback configuration
///
/// Use [`load_config`] to resolve it from all sources.
#[derive(Clone, Debug)]
pub struct PlaybackConfigFile {
    /// Inactivity before an idle action
    pub idle_timeout: Duration,
    /// Longest wait for a preload to become ready
    pub ready_timeout: Duration,
    /// Pause before the visible swap
    pub settle_delay: Duration,
    /// Longest wait for a one-shot clip to end
    pub one_shot_timeout: Duration,
    /// Directory holding the per-mode clip folders
    pub clip_base_dir: String,
    /// Normal skin file names
    pub normal_clips: ClipFiles,
    /// Armored skin file names
    pub armored_clips: ClipFiles,
    /// Passphrase gating the castoff command (no gate when `None`)
    pub castoff_passphrase: Option<String>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for PlaybackConfigFile {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(3000),
            ready_timeout: Duration::from_millis(5000),
            settle_delay: Duration::from_millis(50),
            one_shot_timeout: Duration::from_millis(60_000),
            clip_base_dir: "/videos".to_string(),
            normal_clips: ClipFiles::normal_defaults(),
            armored_clips: ClipFiles::armored_defaults(),
            castoff_passphrase: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PlaybackConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Resolved clip identifiers for both skins
    #[must_use]
    pub fn clip_set(&self) -> ClipSet {
        ClipSet::from_files(&self.clip_base_dir, &self.armored_clips, &self.normal_clips)
    }

    /// Controller timing
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            timing: CrossfadeTiming {
                ready_timeout: self.ready_timeout,
                settle_delay: self.settle_delay,
            },
            idle_timeout: self.idle_timeout,
            one_shot_timeout: self.one_shot_timeout,
        }
    }

    /// Check values that would leave the controller unable to make progress
    ///
    /// The settle delay may be zero; every other timeout must not be.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("idle_timeout_ms", self.idle_timeout),
            ("ready_timeout_ms", self.ready_timeout),
            ("one_shot_timeout_ms", self.one_shot_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.clip_base_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "clips.base_dir is empty".to_string(),
            ));
        }
        self.normal_clips
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("clips.normal: {e}")))?;
        self.armored_clips
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("clips.armored: {e}")))?;
        if matches!(&self.castoff_passphrase, Some(p) if p.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "commands.castoff_passphrase is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/p69real/playback.toml` or
/// `~/.config/p69real/playback.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("p69real").join("playback.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<PlaybackConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PlaybackConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// As [`load_config_from_path`].
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PlaybackConfigFile, ConfigError> {
    let mut config = PlaybackConfigFile::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;
            let toml_config: PlaybackToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;
            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PlaybackConfigFile, toml: &PlaybackToml) {
    if let Some(ms) = toml.timing.idle_timeout_ms {
        config.idle_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.ready_timeout_ms {
        config.ready_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.settle_delay_ms {
        config.settle_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.timing.one_shot_timeout_ms {
        config.one_shot_timeout = Duration::from_millis(ms);
    }

    if let Some(ref dir) = toml.clips.base_dir {
        config.clip_base_dir.clone_from(dir);
    }
    toml.clips.normal.apply(&mut config.normal_clips);
    toml.clips.armored.apply(&mut config.armored_clips);

    if toml.commands.castoff_passphrase.is_some() {
        config
            .castoff_passphrase
            .clone_from(&toml.commands.castoff_passphrase);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut PlaybackConfigFile, env: impl Fn(&str) -> Option<String>) {
    let millis = |key: &str| {
        env(key).and_then(|v| match v.trim().parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => {
                tracing::warn!(key, value = %v, "Ignoring non-numeric environment override");
                None
            }
        })
    };

    let timings = [
        ("PLAYBACK_IDLE_TIMEOUT_MS", &mut config.idle_timeout),
        ("PLAYBACK_READY_TIMEOUT_MS", &mut config.ready_timeout),
        ("PLAYBACK_SETTLE_DELAY_MS", &mut config.settle_delay),
        ("PLAYBACK_ONE_SHOT_TIMEOUT_MS", &mut config.one_shot_timeout),
    ];
    let mut from_env = false;
    for (key, slot) in timings {
        if let Some(value) = millis(key) {
            *slot = value;
            from_env = true;
        }
    }

    if let Some(dir) = env("PLAYBACK_CLIP_BASE_DIR") {
        config.clip_base_dir = dir;
        from_env = true;
    }
    if let Some(passphrase) = env("PLAYBACK_CASTOFF_PASSPHRASE") {
        config.castoff_passphrase = Some(passphrase);
        from_env = true;
    }

    if from_env {
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Idle timeout override (milliseconds)
    pub idle_timeout_ms: Option<u64>,
    /// Settle delay override (milliseconds)
    pub settle_delay_ms: Option<u64>,
    /// Clip base directory override
    pub clip_base_dir: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set idle timeout override
    #[must_use]
    pub fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = Some(ms);
        self
    }

    /// Set settle delay override
    #[must_use]
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = Some(ms);
        self
    }

    /// Set clip base directory override
    #[must_use]
    pub fn with_clip_base_dir(mut self, dir: impl Into<String>) -> Self {
        self.clip_base_dir = Some(dir.into());
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idle_timeout_ms.is_none()
            && self.settle_delay_ms.is_none()
            && self.clip_base_dir.is_none()
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] when an override is out of range.
    pub fn apply(&self, config: &mut PlaybackConfigFile) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }
        config.source = ConfigSource::Cli;

        if let Some(ms) = self.idle_timeout_ms {
            config.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.settle_delay_ms {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ref dir) = self.clip_base_dir {
            config.clip_base_dir.clone_from(dir);
        }
        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
