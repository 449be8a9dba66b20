//! Configuration for the voice-pcm recorder.
//!
//! Provides `AppConfig` (top-level settings), its `audio` and `output`
//! sections, `AppPaths` for cross-platform directories, and TOML persistence
//! via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, OutputConfig};
