//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-pcm\
//!   macOS:   ~/Library/Application Support/voice-pcm/
//!   Linux:   ~/.config/voice-pcm/
//!
//! Data dir (recordings):
//!   Windows: %LOCALAPPDATA%\voice-pcm\
//!   macOS:   ~/Library/Application Support/voice-pcm/
//!   Linux:   ~/.local/share/voice-pcm/

use std::path::PathBuf;

/// Resolved application file and directory paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Default directory for recorded `.pcm` files.
    pub recordings_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-pcm";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let recordings_dir = data_dir.join("recordings");

        Self {
            settings_file,
            recordings_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.recordings_dir.ends_with("recordings"));
        assert!(paths
            .settings_file
            .parent()
            .is_some_and(|d| d.ends_with("voice-pcm")));
    }
}
