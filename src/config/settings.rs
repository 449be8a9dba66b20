//! Settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Missing keys fall back to their defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::{CaptureRequest, TARGET_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture device and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz requested from the input device.  The device may
    /// pick another rate; recordings are always encoded at 16 000 Hz.
    pub device_sample_rate: u32,
    /// Mono samples per captured frame.
    pub frame_size: usize,
    /// Channel count requested from the device.
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Input device name — `None` means the system default.
    pub device_name: Option<String>,
    /// Pause in milliseconds after stopping a superseded session.
    pub settle_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_sample_rate: TARGET_SAMPLE_RATE,
            frame_size: 4_096,
            channels: 1,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: false,
            device_name: None,
            settle_delay_ms: 50,
        }
    }
}

impl AudioConfig {
    /// Device request built from these settings.
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            sample_rate: self.device_sample_rate,
            channels: self.channels,
            frame_size: self.frame_size,
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
            auto_gain_control: self.auto_gain_control,
            device_name: self.device_name.clone(),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Reject settings the capture pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.device_sample_rate > 0, "audio.device_sample_rate must be > 0");
        anyhow::ensure!(self.frame_size > 0, "audio.frame_size must be > 0");
        anyhow::ensure!(self.channels > 0, "audio.channels must be > 0");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// Where the CLI writes finished recordings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: AppPaths::new().recordings_dir,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_pcm::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// let request = config.audio.capture_request();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture settings.
    pub audio: AudioConfig,
    /// Recording output settings.
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.audio.validate()?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.audio.device_sample_rate, loaded.audio.device_sample_rate);
        assert_eq!(original.audio.frame_size, loaded.audio.frame_size);
        assert_eq!(original.audio.device_name, loaded.audio.device_name);
        assert_eq!(original.audio.settle_delay_ms, loaded.audio.settle_delay_ms);
        assert_eq!(original.output.directory, loaded.output.directory);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.audio.device_sample_rate, 16_000);
        assert_eq!(config.audio.frame_size, 4_096);
    }

    #[test]
    fn default_request_is_voice_capture() {
        let req = AppConfig::default().audio.capture_request();
        assert_eq!(req, CaptureRequest::default());
        assert_eq!(AudioConfig::default().settle_delay(), Duration::from_millis(50));
    }

    #[test]
    fn device_rate_only_changes_the_request() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("rate.toml");
        std::fs::write(&path, "[audio]\ndevice_sample_rate = 48000\n").unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.audio.capture_request().sample_rate, 48_000);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[audio]\ndevice_name = \"USB Mic\"\nframe_size = 1024\n").unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.audio.device_name.as_deref(), Some("USB Mic"));
        assert_eq!(cfg.audio.frame_size, 1_024);
        assert_eq!(cfg.audio.device_sample_rate, 16_000);
        assert!(cfg.audio.echo_cancellation);
        assert!(!cfg.audio.auto_gain_control);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[audio]\nframe_size = 0\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("frame_size"));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[audio\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
