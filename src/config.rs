//! Configuration management for the EasyRec recorder

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where recordings are written
    #[serde(default)]
    pub storage: StorageConfig,

    /// Display metric overrides
    #[serde(default)]
    pub display: DisplayConfig,

    /// ffmpeg encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Consent flow behaviour
    #[serde(default)]
    pub consent: ConsentConfig,

    /// Platform capability overrides
    #[serde(default)]
    pub capabilities: CapabilityConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory; recordings go to `<base>/recordings`.
    /// Defaults to the platform data directory.
    pub base_directory: Option<PathBuf>,
}

/// Each field overrides the probed value when set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub density_dpi: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// ffmpeg executable (name on PATH or absolute path)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// H.264 encoder passed to `-c:v`
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Encoder preset
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Microphone device; platform default when unset
    #[serde(default)]
    pub audio_device: Option<String>,

    /// How long to wait for ffmpeg to finalize the file on stop (ms)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// How long ffmpeg must survive after spawn to count as started (ms)
    #[serde(default = "default_startup_grace")]
    pub startup_grace_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentConfig {
    /// Grant capture consent without prompting
    #[serde(default)]
    pub auto_grant: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Force pause/resume support on or off instead of detecting it
    pub pause_resume: Option<bool>,
}

// Default value functions
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_stop_timeout() -> u64 {
    5000
}

fn default_startup_grace() -> u64 {
    300
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            video_codec: default_video_codec(),
            preset: default_preset(),
            audio_device: None,
            stop_timeout_ms: default_stop_timeout(),
            startup_grace_ms: default_startup_grace(),
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = project_dirs()?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Directory under which `recordings/` is created
    pub fn base_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.base_directory {
            return Ok(dir.clone());
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }
}

pub(crate) fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "easyrec", "recorder")
        .context("Failed to determine project directories")
}
