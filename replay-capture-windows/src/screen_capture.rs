//! Desktop frames from ffmpeg's `gdigrab` device.
//!
//! ffmpeg grabs the desktop at the target rate and writes raw BGR24 frames
//! to its stdout; each `next_item()` reads exactly one frame. The grabber
//! paces itself, so no pacer is needed here.

use std::io::Read;
use std::process::{Child, ChildStdout};

use log::{debug, warn};

use replay_capture_core::media::ffmpeg::{screen_grab_args, FfmpegTool};
use replay_capture_core::{CaptureError, CaptureSource, DisplayInfo, SourceInfo, StreamKind, VideoFrame};

pub struct GdigrabScreenSource {
    tool: FfmpegTool,
    display: DisplayInfo,
    target_fps: u32,
    grabber: Option<(Child, ChildStdout)>,
}

impl GdigrabScreenSource {
    pub fn new(tool: FfmpegTool, display: DisplayInfo, target_fps: u32) -> Self {
        Self {
            tool,
            display,
            target_fps,
            grabber: None,
        }
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let mut child = self.tool.spawn_reader(&screen_grab_args(&self.display, self.target_fps))?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(CaptureError::Device("screen grabber has no stdout".into()));
        };
        debug!("screen grabber started (pid {})", child.id());
        self.grabber = Some((child, stdout));
        Ok(())
    }

    fn stop_grabber(&mut self) -> Option<String> {
        let (mut child, _stdout) = self.grabber.take()?;
        let _ = child.kill();
        match child.wait() {
            Ok(status) => Some(status.to_string()),
            Err(e) => Some(e.to_string()),
        }
    }
}

impl CaptureSource<VideoFrame> for GdigrabScreenSource {
    fn next_item(&mut self) -> Result<VideoFrame, CaptureError> {
        if self.grabber.is_none() {
            self.start()?;
        }
        let mut data = vec![0u8; self.display.frame_bytes()];
        let read = match &mut self.grabber {
            Some((_, stdout)) => stdout.read_exact(&mut data),
            None => return Err(CaptureError::Device("screen grabber not running".into())),
        };
        if let Err(e) = read {
            let status = self.stop_grabber().unwrap_or_default();
            warn!("screen grabber stopped delivering: {} ({})", e, status);
            return Err(CaptureError::Device(format!("screen grabber exited: {}", status)));
        }
        Ok(VideoFrame::new(self.display.width, self.display.height, data))
    }

    fn device_info(&self) -> SourceInfo {
        SourceInfo {
            id: "desktop".into(),
            name: format!("Desktop {}x{}", self.display.width, self.display.height),
            kind: StreamKind::Video,
            is_default: true,
        }
    }

    fn close(&mut self) {
        if let Some(status) = self.stop_grabber() {
            debug!("screen grabber stopped: {}", status);
        }
    }
}
