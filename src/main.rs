//! voice-pcm — record the microphone as 16 kHz mono s16le PCM.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG` overrides the `info` default).
//! 2. Load [`AppConfig`] from disk (or `--config`), defaulting on first run.
//! 3. Run the requested subcommand on a tokio runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use voice_pcm::audio::{codec, AudioRecorder, CpalBackend, TARGET_SAMPLE_RATE};
use voice_pcm::config::{AppConfig, AppPaths};

#[derive(Parser)]
#[command(name = "voice-pcm")]
#[command(version)]
#[command(about = "Capture microphone audio as 16 kHz mono s16le PCM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to settings.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until the time limit or Ctrl+C, then write raw PCM
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        seconds: Option<f32>,

        /// Output file (defaults to a timestamped file in the recordings dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input device name (overrides the config)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// List input devices
    Devices,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration back to settings.toml
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings_file = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);
    let config = AppConfig::load_from(&settings_file)?;

    match cli.command {
        Commands::Record {
            seconds,
            output,
            device,
        } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .context("failed to create tokio runtime")?;
            rt.block_on(record(config, seconds, output, device))
        }
        Commands::Devices => list_devices(),
        Commands::Config { save } => show_config(&config, &settings_file, save),
    }
}

async fn record(
    mut config: AppConfig,
    seconds: Option<f32>,
    output: Option<PathBuf>,
    device: Option<String>,
) -> Result<()> {
    if device.is_some() {
        config.audio.device_name = device;
    }

    let recorder = AudioRecorder::with_settle_delay(
        Arc::new(CpalBackend::new()),
        config.audio.capture_request(),
        config.audio.settle_delay(),
    );

    let limit = record_limit(seconds)?;

    recorder.start().await?;
    match limit {
        Some(limit) => {
            log::info!("Recording for {:.1}s (Ctrl+C to stop early)", limit.as_secs_f32());
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
            }
        }
        None => {
            log::info!("Recording (Ctrl+C to stop)");
            if let Err(e) = tokio::signal::ctrl_c().await {
                // Without a signal handler there is no way to stop later.
                recorder.teardown();
                return Err(e).context("failed to listen for Ctrl+C");
            }
        }
    }

    if recorder.device_lost() {
        log::warn!("Input device was lost; saving what was captured");
    }

    let Some(pcm) = recorder.stop().await? else {
        log::warn!("No audio captured");
        return Ok(());
    };

    let path = match output {
        Some(path) => path,
        None => default_output_path(&config.output.directory),
    };
    write_pcm(&path, &pcm)?;

    let samples = codec::dequantize_i16(&codec::deserialize_le(&pcm)?);
    let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
    println!(
        "{} ({} bytes, {:.2}s @ {} Hz mono s16le, peak {:.3})",
        path.display(),
        pcm.len(),
        codec::pcm_duration_secs(&pcm, TARGET_SAMPLE_RATE),
        TARGET_SAMPLE_RATE,
        peak
    );
    Ok(())
}

/// Parse `--seconds` into a timeout, rejecting negative, NaN and
/// unrepresentably large values.
fn record_limit(seconds: Option<f32>) -> Result<Option<Duration>> {
    seconds
        .map(|secs| {
            Duration::try_from_secs_f32(secs)
                .with_context(|| format!("invalid --seconds value {secs}"))
        })
        .transpose()
}

fn default_output_path(dir: &Path) -> PathBuf {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    dir.join(format!("recording-{stamp}.pcm"))
}

fn write_pcm(path: &Path, pcm: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, pcm).with_context(|| format!("writing {}", path.display()))
}

fn list_devices() -> Result<()> {
    let default = CpalBackend::default_input_device_name();
    let names = CpalBackend::input_device_names()?;
    if names.is_empty() {
        println!("No input devices found");
    }
    for name in names {
        let marker = if Some(&name) == default.as_ref() { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

fn show_config(config: &AppConfig, settings_file: &Path, save: bool) -> Result<()> {
    println!("# {}", settings_file.display());
    println!("{}", toml::to_string_pretty(config)?);
    if save {
        config.save_to(settings_file)?;
        log::info!("Saved {}", settings_file.display());
    }
    Ok(())
}
