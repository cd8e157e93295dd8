//! instant-replay: keeps the last N seconds of screen, system audio and
//! microphone in memory and saves them to a video file on demand.
//!
//! Usage:
//!   instant-replay [OPTIONS]
//!
//! With `--record <SECS>` it captures for that long, saves once and exits.
//! Otherwise, while running, type a command and press Enter:
//!   p / status   show buffer occupancy
//!   s / flush    save the buffered replay
//!   q / quit     stop and exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use replay_capture_core::media::ffmpeg::FfmpegTool;
use replay_capture_core::{CaptureBackend, Controller, Recorder, RecorderConfig, SyntheticBackend};

mod console;

#[derive(Parser, Debug)]
#[command(name = "instant-replay", about = "Save the last moments of your screen and audio on demand", version)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds of history to keep
    #[arg(short, long)]
    duration: Option<f64>,

    /// Record for this many seconds, save once and exit
    #[arg(long, value_name = "SECS", conflicts_with = "duration")]
    record: Option<f64>,

    /// Target screen capture rate
    #[arg(long)]
    fps: Option<u32>,

    /// Directory for timestamped replay files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Fixed output file, overwritten on every save
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable microphone capture
    #[arg(long)]
    no_mic: bool,

    /// Disable system audio capture
    #[arg(long)]
    no_system_audio: bool,

    /// Use generated test video and tones instead of real devices
    #[arg(long)]
    synthetic: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn recorder_config(&self) -> Result<RecorderConfig> {
        let mut config = match &self.config {
            Some(path) => RecorderConfig::load(path)?,
            None => RecorderConfig::default(),
        };
        if let Some(duration) = self.duration.or(self.record) {
            config.buffer_duration_secs = duration;
        }
        if let Some(fps) = self.fps {
            config.target_fps = fps;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.output_file = Some(output.clone());
        }
        if self.no_mic {
            config.enable_mic = false;
        }
        if self.no_system_audio {
            config.enable_system_audio = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let config = cli.recorder_config()?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let version = FfmpegTool::new(config.encoder.ffmpeg_path.clone())
        .version()
        .context("ffmpeg is required to save replays")?;
    info!("using {}", version);

    let backend = select_backend(&cli, &config)?;
    let recorder = Recorder::build(config, backend.as_ref()).context("failed to set up capture")?;
    let controller = Arc::new(Controller::with_ffmpeg(recorder).with_delegate(Arc::new(console::ConsoleDelegate)));

    if cli.record.is_some() {
        println!(
            "Recording for {}s.",
            controller.recorder().config().buffer_duration_secs
        );
        controller.record_once().context("recording failed")?;
        return Ok(());
    }

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    console::spawn_stdin_reader(events_tx).context("failed to read commands from stdin")?;

    println!(
        "Recording the last {}s. Commands: p (status), s (save replay), q (quit).",
        controller.recorder().config().buffer_duration_secs
    );
    controller.run(events_rx)?;
    println!("Stopped.");
    Ok(())
}

fn select_backend(cli: &Cli, config: &RecorderConfig) -> Result<Box<dyn CaptureBackend>> {
    if cli.synthetic {
        return Ok(Box::new(SyntheticBackend::default()));
    }
    platform_backend(config)
}

#[cfg(target_os = "windows")]
fn platform_backend(config: &RecorderConfig) -> Result<Box<dyn CaptureBackend>> {
    Ok(Box::new(replay_capture_windows::WindowsBackend::new(
        config.encoder.ffmpeg_path.clone(),
    )))
}

#[cfg(not(target_os = "windows"))]
fn platform_backend(_config: &RecorderConfig) -> Result<Box<dyn CaptureBackend>> {
    anyhow::bail!("no capture backend for this platform; run with --synthetic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "instant-replay",
            "--duration",
            "15",
            "--fps",
            "24",
            "--no-mic",
            "-o",
            "clip.mp4",
        ])
        .unwrap();
        let config = cli.recorder_config().unwrap();

        assert_eq!(config.buffer_duration_secs, 15.0);
        assert_eq!(config.target_fps, 24);
        assert!(!config.enable_mic);
        assert!(config.enable_system_audio);
        assert_eq!(config.output_file, Some(PathBuf::from("clip.mp4")));
    }

    #[test]
    fn record_sets_the_buffer_span() {
        let cli = Cli::try_parse_from(["instant-replay", "--record", "12"]).unwrap();
        let config = cli.recorder_config().unwrap();
        assert_eq!(config.buffer_duration_secs, 12.0);

        assert!(Cli::try_parse_from(["instant-replay", "--record", "12", "--duration", "5"]).is_err());
        let cli = Cli::try_parse_from(["instant-replay", "--record", "inf"]).unwrap();
        assert!(cli.recorder_config().is_err());
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["instant-replay", "--fps", "0"]).unwrap();
        assert!(cli.recorder_config().is_err());
    }

    #[test]
    fn config_file_is_layered_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "target_fps": 12, "buffer_duration_secs": 5.0 }"#).unwrap();

        let cli = Cli::try_parse_from(["instant-replay", "--config", path.to_str().unwrap(), "--fps", "20"]).unwrap();
        let config = cli.recorder_config().unwrap();

        assert_eq!(config.target_fps, 20);
        assert_eq!(config.buffer_duration_secs, 5.0);
    }
}
