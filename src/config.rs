//! Configuration for the check-in pipeline.
//!
//! The compression triggers, resolution caps, fps/bitrate pairs, and
//! probe thresholds were tuned empirically rather than derived, so all
//! of them live here as adjustable parameters instead of hard-coded law.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Recording configuration (capture constraints, chunk cadence)
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Adaptive compression configuration
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Network probe configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Maximum capture width requested from the device
    #[serde(default = "default_capture_width")]
    pub max_width: u32,

    /// Maximum capture height requested from the device
    #[serde(default = "default_capture_height")]
    pub max_height: u32,

    /// Interval between encoded chunks while recording (ms)
    #[serde(default = "default_chunk_interval")]
    pub chunk_interval_ms: u64,

    /// Whether to capture an audio track alongside video
    #[serde(default = "default_true")]
    pub capture_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Clips larger than this are re-encoded regardless of link quality
    #[serde(default = "default_compression_trigger")]
    pub trigger_size_bytes: u64,

    /// Output canvas bound, width (the canvas is a 4:3 box)
    #[serde(default = "default_canvas_width")]
    pub max_width: u32,

    /// Output canvas bound, height
    #[serde(default = "default_canvas_height")]
    pub max_height: u32,

    /// Frame rate used when the link is classified slow
    #[serde(default = "default_slow_fps")]
    pub slow_fps: u32,

    /// Video bitrate in Kbps used when the link is classified slow
    #[serde(default = "default_slow_bitrate")]
    pub slow_bitrate_kbps: u32,

    /// Frame rate used on a normal link
    #[serde(default = "default_normal_fps")]
    pub normal_fps: u32,

    /// Video bitrate in Kbps used on a normal link
    #[serde(default = "default_normal_bitrate")]
    pub normal_bitrate_kbps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// URL of the small probe object used to time one round trip.
    /// When unset, the probe reports the fallback throughput.
    pub probe_url: Option<String>,

    /// Probe round-trip timeout (ms)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Throughput assumed when probing fails (bytes/sec)
    #[serde(default = "default_fallback_throughput")]
    pub fallback_throughput_bytes_per_sec: f64,

    /// Links below this throughput are classified slow (bytes/sec)
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Hard ceiling on uploaded clip size; checked before any network
    /// activity
    #[serde(default = "default_max_upload_size")]
    pub max_size_bytes: u64,

    /// Synthetic progress never exceeds this before the backend
    /// confirms completion (percent)
    #[serde(default = "default_progress_cap")]
    pub progress_cap_percent: u8,

    /// Cadence of synthetic progress updates (ms)
    #[serde(default = "default_progress_tick")]
    pub progress_tick_ms: u64,
}

// Default value functions
fn default_capture_width() -> u32 {
    1280
}

fn default_capture_height() -> u32 {
    720
}

fn default_chunk_interval() -> u64 {
    1000 // one encoded chunk per second
}

fn default_true() -> bool {
    true
}

fn default_compression_trigger() -> u64 {
    5 * 1024 * 1024 // 5 MB
}

fn default_canvas_width() -> u32 {
    640
}

fn default_canvas_height() -> u32 {
    480
}

fn default_slow_fps() -> u32 {
    10
}

fn default_slow_bitrate() -> u32 {
    250
}

fn default_normal_fps() -> u32 {
    15
}

fn default_normal_bitrate() -> u32 {
    500
}

fn default_probe_timeout() -> u64 {
    4000
}

fn default_fallback_throughput() -> f64 {
    1024.0 * 1024.0 // assume 1 MB/s when the probe fails
}

fn default_slow_threshold() -> f64 {
    512.0 * 1024.0
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MB
}

fn default_progress_cap() -> u8 {
    95
}

fn default_progress_tick() -> u64 {
    250
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_width: default_capture_width(),
            max_height: default_capture_height(),
            chunk_interval_ms: default_chunk_interval(),
            capture_audio: true,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            trigger_size_bytes: default_compression_trigger(),
            max_width: default_canvas_width(),
            max_height: default_canvas_height(),
            slow_fps: default_slow_fps(),
            slow_bitrate_kbps: default_slow_bitrate(),
            normal_fps: default_normal_fps(),
            normal_bitrate_kbps: default_normal_bitrate(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_timeout_ms: default_probe_timeout(),
            fallback_throughput_bytes_per_sec: default_fallback_throughput(),
            slow_threshold_bytes_per_sec: default_slow_threshold(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_upload_size(),
            progress_cap_percent: default_progress_cap(),
            progress_tick_ms: default_progress_tick(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recording: RecordingConfig::default(),
            compression: CompressionConfig::default(),
            network: NetworkConfig::default(),
            upload: UploadConfig::default(),
            config_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default location or create defaults
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path()?)
    }

    /// Load configuration from an explicit path, creating it with
    /// defaults if absent
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: PipelineConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let config = PipelineConfig {
                config_path: Some(config_path),
                ..PipelineConfig::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

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
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("app", "dailycheckin", "checkin-pipeline")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
