//! Encode and mux services backed by an `ffmpeg` executable.
//!
//! Each operation is one short-lived ffmpeg process. Argument vectors are
//! built by plain functions so they can be checked without ffmpeg installed.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use log::debug;

use crate::models::config::EncoderSettings;
use crate::models::error::CaptureError;
use crate::models::media::VideoFrame;
use crate::models::stream::DisplayInfo;
use crate::traits::media_encoder::{AudioEncoder, Muxer, VideoEncoder};

/// Lines of ffmpeg stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 6;

/// Handle to the ffmpeg executable.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    path: PathBuf,
}

impl FfmpegTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First line of `ffmpeg -version`.
    pub fn version(&self) -> Result<String, CaptureError> {
        let output = self
            .command()
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("cannot run {}: {}", self.path.display(), e)))?;
        if !output.status.success() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "{} -version exited with {}",
                self.path.display(),
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    /// Run ffmpeg to completion. `feed` writes to its stdin, which is closed afterwards.
    ///
    /// Errors carry the exit status and the tail of stderr.
    pub fn run<F>(&self, args: &[String], feed: Option<F>) -> Result<(), String>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        debug!("running {} {}", self.path.display(), args.join(" "));

        let mut child = self
            .command()
            .args(args)
            .stdin(if feed.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start {}: {}", self.path.display(), e))?;

        let stderr = child.stderr.take().ok_or("failed to capture ffmpeg stderr")?;
        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = thread::spawn(move || {
            let mut output = String::new();
            let mut stderr = stderr;
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {}>", err),
            }
        });

        let feed_result = match (feed, child.stdin.take()) {
            (Some(feed), Some(mut stdin)) => feed(&mut stdin),
            _ => Ok(()),
        };

        let status = child.wait().map_err(|e| format!("failed to wait for ffmpeg: {}", e))?;
        let stderr = stderr_task.join().unwrap_or_default();

        if !status.success() {
            return Err(format!("ffmpeg exited with {}: {}", status, tail(&stderr, STDERR_TAIL_LINES)));
        }
        feed_result.map_err(|e| format!("failed to stream input to ffmpeg: {}", e))
    }

    /// Start a long-running ffmpeg whose stdout is read by the caller.
    pub fn spawn_reader(&self, args: &[String]) -> Result<Child, CaptureError> {
        debug!("spawning {} {}", self.path.display(), args.join(" "));
        self.command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::DeviceNotAvailable(format!("failed to start {}: {}", self.path.display(), e)))
    }

    fn command(&self) -> Command {
        #[allow(unused_mut)]
        let mut cmd = Command::new(&self.path);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
        cmd
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join(" | ")
}

/// Frame rate as ffmpeg expects it: integral rates without decimals.
pub fn format_rate(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-6 {
        format!("{}", fps.round() as u64)
    } else {
        format!("{:.3}", fps)
    }
}

fn base_args() -> Vec<String> {
    ["-y", "-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Raw BGR24 frames on stdin → compressed video container.
pub fn video_encode_args(settings: &EncoderSettings, fps: f64, size: (u32, u32), output: &Path) -> Vec<String> {
    let mut args = base_args();
    // -nostdin would close the frame pipe.
    args.retain(|a| a != "-nostdin");
    args.extend([
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgr24".to_string(),
        "-s".to_string(),
        format!("{}x{}", size.0, size.1),
        "-r".to_string(),
        format_rate(fps),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        settings.video_codec.clone(),
    ]);
    if let Some(tag) = &settings.video_tag {
        args.push("-vtag".to_string());
        args.push(tag.clone());
    }
    args.extend([
        "-q:v".to_string(),
        settings.video_quality.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output.display().to_string(),
    ]);
    args
}

/// PCM WAV → compressed audio.
pub fn audio_encode_args(settings: &EncoderSettings, input: &Path, output: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        input.display().to_string(),
        "-vn".to_string(),
        "-c:a".to_string(),
        settings.audio_codec.clone(),
        "-b:a".to_string(),
        settings.audio_bitrate.clone(),
        output.display().to_string(),
    ]);
    args
}

/// Stream-copy video (and audio, when present) into the output container.
pub fn mux_args(video: &Path, audio: Option<&Path>, output: &Path) -> Vec<String> {
    let mut args = base_args();
    args.push("-i".to_string());
    args.push(video.display().to_string());
    if let Some(audio) = audio {
        args.push("-i".to_string());
        args.push(audio.display().to_string());
    }
    args.extend(["-map".to_string(), "0:v:0".to_string()]);
    if audio.is_some() {
        args.extend(["-map".to_string(), "1:a:0".to_string()]);
    }
    args.extend(["-c:v".to_string(), "copy".to_string()]);
    if audio.is_some() {
        args.extend(["-c:a".to_string(), "copy".to_string()]);
    }
    args.push(output.display().to_string());
    args
}

/// Primary display via gdigrab, as raw BGR24 frames on stdout.
pub fn screen_grab_args(display: &DisplayInfo, target_fps: u32) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "gdigrab".to_string(),
        "-framerate".to_string(),
        target_fps.to_string(),
        "-offset_x".to_string(),
        "0".to_string(),
        "-offset_y".to_string(),
        "0".to_string(),
        "-video_size".to_string(),
        format!("{}x{}", display.width, display.height),
        "-i".to_string(),
        "desktop".to_string(),
        "-pix_fmt".to_string(),
        "bgr24".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]
}

/// Video encoder piping raw frames into ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegVideoEncoder {
    tool: FfmpegTool,
    settings: EncoderSettings,
}

impl FfmpegVideoEncoder {
    pub fn new(tool: FfmpegTool, settings: EncoderSettings) -> Self {
        Self { tool, settings }
    }
}

impl VideoEncoder for FfmpegVideoEncoder {
    fn encode(&self, frames: &[VideoFrame], fps: f64, size: (u32, u32), output: &Path) -> Result<(), CaptureError> {
        if let Some(bad) = frames.iter().find(|f| f.size() != size || !f.is_well_formed()) {
            return Err(CaptureError::EncodingFailed(format!(
                "frame {}x{} does not match {}x{}",
                bad.width, bad.height, size.0, size.1
            )));
        }

        let args = video_encode_args(&self.settings, fps, size, output);
        self.tool
            .run(
                &args,
                Some(|stdin: &mut dyn Write| {
                    for frame in frames {
                        stdin.write_all(&frame.data)?;
                    }
                    stdin.flush()
                }),
            )
            .map_err(CaptureError::EncodingFailed)
    }
}

/// Audio encoder compressing a WAV file with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegAudioEncoder {
    tool: FfmpegTool,
    settings: EncoderSettings,
}

impl FfmpegAudioEncoder {
    pub fn new(tool: FfmpegTool, settings: EncoderSettings) -> Self {
        Self { tool, settings }
    }
}

impl AudioEncoder for FfmpegAudioEncoder {
    fn encode(&self, input_wav: &Path, output: &Path) -> Result<(), CaptureError> {
        let args = audio_encode_args(&self.settings, input_wav, output);
        self.tool
            .run(&args, None::<fn(&mut dyn Write) -> io::Result<()>>)
            .map_err(CaptureError::EncodingFailed)
    }
}

/// Stream-copy muxer.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    tool: FfmpegTool,
}

impl FfmpegMuxer {
    pub fn new(tool: FfmpegTool) -> Self {
        Self { tool }
    }
}

impl Muxer for FfmpegMuxer {
    fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<(), CaptureError> {
        let args = mux_args(video, audio, output);
        self.tool
            .run(&args, None::<fn(&mut dyn Write) -> io::Result<()>>)
            .map_err(CaptureError::MuxFailed)
    }
}
