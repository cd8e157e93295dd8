//! Terminal reporting and stdin control for the recorder.

use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::Sender;
use log::{debug, warn};

use replay_capture_core::{
    CaptureError, ControlEvent, ControllerState, FlushResult, RecorderDelegate, RecorderStatus, StreamFault,
};

/// Prints user-facing results; everything else goes through the logger.
pub struct ConsoleDelegate;

impl RecorderDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: ControllerState) {
        debug!("recorder state: {:?}", state);
    }

    fn on_stream_fault(&self, fault: &StreamFault) {
        eprintln!("! {}", fault);
    }

    fn on_flush_finished(&self, result: &FlushResult) {
        let audio = match result.merged_audio_secs {
            Some(secs) => format!("{:.1}s audio", secs),
            None => "no audio".to_string(),
        };
        println!(
            "Saved {} ({:.1}s video at {:.1} fps, {})",
            result.output_path.display(),
            result.duration_secs,
            result.video_fps,
            audio
        );
    }

    fn on_flush_failed(&self, error: &CaptureError) {
        eprintln!("! replay not saved: {}", error);
    }

    fn on_status(&self, status: &RecorderStatus) {
        println!("{}", status);
    }
}

/// Forward stdin lines as control events until EOF or `quit`.
///
/// EOF is reported as `Quit` so a closed terminal shuts the recorder down.
pub fn spawn_stdin_reader(events: Sender<ControlEvent>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("stdin".into()).spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("failed to read stdin: {}", e);
                    break;
                }
            };
            match ControlEvent::from_command(&line) {
                Some(event) => {
                    if events.send(event).is_err() || event == ControlEvent::Quit {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("Unknown command {:?}. Use p (status), s (save replay), q (quit).", line.trim()),
            }
        }
        let _ = events.send(ControlEvent::Quit);
    })
}
