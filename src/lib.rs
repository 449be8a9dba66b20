//! Microphone capture to 16 kHz mono signed 16-bit little-endian PCM.
//!
//! * [`audio`] — capture controller, device backends and the PCM codec.
//! * [`config`] — persisted settings and platform paths.

pub mod audio;
pub mod config;
