use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::models::error::{CaptureError, FlushStage};
use crate::models::flush_result::{MergedAudio, SnapshotInfo};
use crate::processing::audio_mixer::{self, AudioMixer};
use crate::processing::wav_format::{self, WavData};
use crate::storage::workspace::{FlushWorkspace, PartialFile};
use crate::traits::media_encoder::{AudioEncoder, Muxer};

/// What a merge produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub output_path: PathBuf,
    pub audio: Option<MergedAudio>,
    pub intermediates_removed: usize,
}

/// Overlays the audio snapshots and muxes them against the video snapshot.
///
/// ```text
/// mic.wav ──┐
///           ├→ overlay → mixed.wav → encode → combined.mp3 ─┐
/// system.wav┘                                               ├→ mux (copy) → output
/// screen.avi ───────────────────────────────────────────────┘
/// ```
pub struct MergePipeline {
    audio_encoder: Arc<dyn AudioEncoder>,
    muxer: Arc<dyn Muxer>,
}

impl MergePipeline {
    pub fn new(audio_encoder: Arc<dyn AudioEncoder>, muxer: Arc<dyn Muxer>) -> Self {
        Self { audio_encoder, muxer }
    }

    /// Overlay then mux, then remove the intermediates.
    ///
    /// Errors are attributed to the `Overlay` or `Mux` stage. Intermediates
    /// of a failed merge stay for the workspace to drop.
    pub fn merge(
        &self,
        workspace: &FlushWorkspace,
        video: &SnapshotInfo,
        mic: Option<&SnapshotInfo>,
        system: Option<&SnapshotInfo>,
        output: &Path,
    ) -> Result<MergeOutcome, CaptureError> {
        let audio = self
            .overlay_audio(
                mic.map(|s| s.path.as_path()),
                system.map(|s| s.path.as_path()),
                &workspace.mixed_path(),
                &workspace.combined_audio_path(),
            )
            .map_err(|e| e.at_stage(FlushStage::Overlay))?;

        let output_path = self
            .mux(&video.path, audio.as_ref().map(|a| a.path.as_path()), output)
            .map_err(|e| e.at_stage(FlushStage::Mux))?;

        let mut intermediates = vec![video.path.clone(), workspace.mixed_path(), workspace.combined_audio_path()];
        intermediates.extend(mic.map(|s| s.path.clone()));
        intermediates.extend(system.map(|s| s.path.clone()));
        let intermediates_removed = workspace.remove_files(&intermediates);
        debug!("removed {} intermediates", intermediates_removed);

        Ok(MergeOutcome {
            output_path,
            audio,
            intermediates_removed,
        })
    }

    /// Sum the available audio snapshots from offset 0 and compress the result.
    ///
    /// Inputs are converted to the higher sample rate and the larger channel
    /// count. One input alone passes through; no inputs yields `None`.
    pub fn overlay_audio(
        &self,
        mic: Option<&Path>,
        system: Option<&Path>,
        mixed_wav: &Path,
        output: &Path,
    ) -> Result<Option<MergedAudio>, CaptureError> {
        let tracks: Vec<WavData> = [mic, system]
            .into_iter()
            .flatten()
            .map(wav_format::read_wav)
            .collect::<Result<_, _>>()?;

        let formats: Vec<_> = tracks.iter().map(|t| t.format).collect();
        let Some(mixer) = AudioMixer::reconciling(&formats) else {
            debug!("no audio snapshots to overlay");
            return Ok(None);
        };

        let refs: Vec<&WavData> = tracks.iter().collect();
        let mixed = mixer.overlay(&refs);
        if mixed.is_empty() {
            warn!("audio snapshots contained no samples");
            return Ok(None);
        }

        let mixed_file = PartialFile::new(mixed_wav);
        wav_format::write_wav(mixed_file.path(), mixer.target, std::iter::once(&mixed[..]))?;
        let mixed_wav = mixed_file.commit()?;

        let encoded = PartialFile::new(output);
        self.audio_encoder.encode(&mixed_wav, encoded.path())?;
        let path = encoded.commit()?;

        let frames = mixed.len() / mixer.target.channels.max(1) as usize;
        let duration_secs = frames as f64 / mixer.target.sample_rate as f64;
        info!(
            "overlaid {} audio track(s): {:.2}s at {} Hz x{} (peak {:.2})",
            tracks.len(),
            duration_secs,
            mixer.target.sample_rate,
            mixer.target.channels,
            audio_mixer::peak_level(&mixed)
        );

        Ok(Some(MergedAudio {
            path,
            duration_secs,
            sample_rate: mixer.target.sample_rate,
            channels: mixer.target.channels,
        }))
    }

    /// Combine the video track and the merged audio track with stream copy.
    ///
    /// Fails with `MuxFailed` if an input is missing or empty. The output is
    /// written beside its final name and renamed into place.
    pub fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<PathBuf, CaptureError> {
        require_input(video)?;
        if let Some(audio) = audio {
            require_input(audio)?;
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        let partial = PartialFile::new(output);
        self.muxer.mux(video, audio, partial.path())?;
        partial.commit()
    }
}

fn require_input(path: &Path) -> Result<(), CaptureError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(CaptureError::MuxFailed(format!("{} is empty", path.display()))),
        Err(_) => Err(CaptureError::MuxFailed(format!("{} is missing", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::EncoderSettings;
    use crate::models::stream::{AudioFormat, StreamKind};
    use approx::assert_relative_eq;

    /// "Encodes" by copying the WAV.
    struct CopyEncoder;

    impl AudioEncoder for CopyEncoder {
        fn encode(&self, input_wav: &Path, output: &Path) -> Result<(), CaptureError> {
            fs::copy(input_wav, output)?;
            Ok(())
        }
    }

    /// Writes the names of its inputs.
    struct ListingMuxer;

    impl Muxer for ListingMuxer {
        fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<(), CaptureError> {
            let mut listing = format!("video={}\n", video.display());
            if let Some(audio) = audio {
                listing.push_str(&format!("audio={}\n", audio.display()));
            }
            fs::write(output, listing)?;
            Ok(())
        }
    }

    struct FailingMuxer;

    impl Muxer for FailingMuxer {
        fn mux(&self, _video: &Path, _audio: Option<&Path>, output: &Path) -> Result<(), CaptureError> {
            fs::write(output, b"moov missing")?;
            Err(CaptureError::MuxFailed("codec not supported in container".into()))
        }
    }

    fn pipeline() -> MergePipeline {
        MergePipeline::new(Arc::new(CopyEncoder), Arc::new(ListingMuxer))
    }

    fn write_tone(path: &Path, sample_rate: u32, channels: u16, frames: usize, value: i16) {
        let samples = vec![value; frames * channels as usize];
        wav_format::write_wav(path, AudioFormat { sample_rate, channels }, std::iter::once(&samples[..])).unwrap();
    }

    fn snapshot(kind: StreamKind, path: PathBuf) -> SnapshotInfo {
        SnapshotInfo {
            kind,
            items: 1,
            duration_secs: 0.0,
            path,
        }
    }

    #[test]
    fn overlay_lasts_as_long_as_the_longer_track() {
        let dir = tempfile::tempdir().unwrap();
        let mic = dir.path().join("mic.wav");
        let system = dir.path().join("system.wav");
        write_tone(&mic, 8000, 1, 3 * 1024, 100);
        write_tone(&system, 8000, 1, 5 * 1024, 10);

        let merged = pipeline()
            .overlay_audio(Some(&mic), Some(&system), &dir.path().join("mixed.wav"), &dir.path().join("combined.mp3"))
            .unwrap()
            .unwrap();

        assert_relative_eq!(merged.duration_secs, 5.0 * 1024.0 / 8000.0);
        let wav = wav_format::read_wav(&merged.path).unwrap();
        assert_eq!(wav.samples[0], 110);
        assert_eq!(*wav.samples.last().unwrap(), 10);
    }

    #[test]
    fn single_input_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.wav");
        write_tone(&system, 48000, 2, 480, 7);

        let merged = pipeline()
            .overlay_audio(None, Some(&system), &dir.path().join("mixed.wav"), &dir.path().join("combined.mp3"))
            .unwrap()
            .unwrap();

        assert_eq!((merged.sample_rate, merged.channels), (48000, 2));
        let wav = wav_format::read_wav(&merged.path).unwrap();
        assert!(wav.samples.iter().all(|&s| s == 7));
    }

    #[test]
    fn no_inputs_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let merged = pipeline()
            .overlay_audio(None, None, &dir.path().join("mixed.wav"), &dir.path().join("combined.mp3"))
            .unwrap();
        assert!(merged.is_none());
        assert!(!dir.path().join("mixed.wav").exists());
    }

    #[test]
    fn mux_rejects_missing_or_empty_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("screen.avi");
        let out = dir.path().join("out.mp4");

        let err = pipeline().mux(&video, None, &out).unwrap_err();
        assert!(matches!(err, CaptureError::MuxFailed(_)));

        fs::write(&video, b"").unwrap();
        assert!(matches!(pipeline().mux(&video, None, &out), Err(CaptureError::MuxFailed(_))));
        assert!(!out.exists());
    }

    #[test]
    fn failed_mux_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("screen.avi");
        fs::write(&video, b"frames").unwrap();
        let out = dir.path().join("out.mp4");

        let pipeline = MergePipeline::new(Arc::new(CopyEncoder), Arc::new(FailingMuxer));
        assert!(pipeline.mux(&video, None, &out).is_err());
        assert!(!out.exists());
        assert!(!dir.path().join("out.partial.mp4").exists());
    }

    #[test]
    fn merge_removes_intermediates_and_keeps_output() {
        let root = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let ws = FlushWorkspace::create(root.path(), &EncoderSettings::default()).unwrap();

        fs::write(ws.video_path(), b"frames").unwrap();
        write_tone(&ws.audio_path(StreamKind::Mic), 8000, 1, 800, 1);
        write_tone(&ws.audio_path(StreamKind::System), 16000, 2, 1600, 1);

        let video = snapshot(StreamKind::Video, ws.video_path());
        let mic = snapshot(StreamKind::Mic, ws.audio_path(StreamKind::Mic));
        let system = snapshot(StreamKind::System, ws.audio_path(StreamKind::System));
        let output = out_dir.path().join("nested").join("replay.mp4");

        let outcome = pipeline().merge(&ws, &video, Some(&mic), Some(&system), &output).unwrap();

        assert_eq!(outcome.output_path, output);
        assert_eq!(outcome.intermediates_removed, 5);
        assert!(ws.files().is_empty());
        let audio = outcome.audio.unwrap();
        assert_eq!((audio.sample_rate, audio.channels), (16000, 2));
        assert_relative_eq!(audio.duration_secs, 0.1, epsilon = 1e-3);
        let listing = fs::read_to_string(&output).unwrap();
        assert!(listing.contains("combined.mp3"));
    }

    #[test]
    fn mux_failure_is_attributed_to_mux_stage() {
        let root = tempfile::tempdir().unwrap();
        let ws = FlushWorkspace::create(root.path(), &EncoderSettings::default()).unwrap();
        fs::write(ws.video_path(), b"frames").unwrap();
        let video = snapshot(StreamKind::Video, ws.video_path());

        let pipeline = MergePipeline::new(Arc::new(CopyEncoder), Arc::new(FailingMuxer));
        let err = pipeline
            .merge(&ws, &video, None, None, &root.path().join("replay.mp4"))
            .unwrap_err();
        assert_eq!(err.stage(), Some(FlushStage::Mux));
    }
}
