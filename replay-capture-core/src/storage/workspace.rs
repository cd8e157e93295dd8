use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::models::config::EncoderSettings;
use crate::models::error::CaptureError;
use crate::models::stream::StreamKind;

/// Scratch directory for one flush.
///
/// Every flush gets `<root>/instant-replay-<uuid>/`, so intermediates from
/// an earlier (or crashed) flush can never be mistaken for this one's. The
/// directory and anything left in it are removed on drop.
#[derive(Debug)]
pub struct FlushWorkspace {
    id: String,
    dir: PathBuf,
    video_extension: String,
    audio_extension: String,
}

impl FlushWorkspace {
    pub fn create(root: &Path, settings: &EncoderSettings) -> Result<Self, CaptureError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = root.join(format!("instant-replay-{}", id));

        fs::create_dir_all(root)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", root.display(), e)))?;
        fs::create_dir(&dir)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", dir.display(), e)))?;
        debug!("flush workspace {}", dir.display());

        Ok(Self {
            id,
            dir,
            video_extension: settings.video_extension.clone(),
            audio_extension: settings.audio_extension.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Raw video snapshot, e.g. `screen.avi`.
    pub fn video_path(&self) -> PathBuf {
        self.dir.join(format!("screen.{}", self.video_extension))
    }

    /// WAV snapshot of one audio stream.
    pub fn audio_path(&self, kind: StreamKind) -> PathBuf {
        self.dir.join(format!("{}.wav", kind.short_name()))
    }

    /// Uncompressed overlay of both audio snapshots.
    pub fn mixed_path(&self) -> PathBuf {
        self.dir.join("mixed.wav")
    }

    /// Compressed merged audio track, e.g. `combined.mp3`.
    pub fn combined_audio_path(&self) -> PathBuf {
        self.dir.join(format!("combined.{}", self.audio_extension))
    }

    /// Files currently in the workspace.
    pub fn files(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Remove the given intermediates. Best-effort: failures are logged.
    ///
    /// Returns how many files were removed.
    pub fn remove_files(&self, paths: &[PathBuf]) -> usize {
        let mut removed = 0;
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to remove intermediate {}: {}", path.display(), e),
            }
        }
        removed
    }
}

impl Drop for FlushWorkspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove flush workspace {}: {}", self.dir.display(), e);
            }
        }
    }
}

/// A file written under a temporary name and renamed into place on success.
///
/// `mic.wav` is written as `mic.partial.wav`; if the writer fails or the
/// guard is dropped before `commit`, the partial file is deleted, so a
/// failed write never leaves a valid-looking output behind.
#[derive(Debug)]
pub struct PartialFile {
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PartialFile {
    pub fn new(target: &Path) -> Self {
        Self {
            partial: partial_path(target),
            target: target.to_path_buf(),
            committed: false,
        }
    }

    /// Where the writer should write.
    pub fn path(&self) -> &Path {
        &self.partial
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the finished file to its target name.
    pub fn commit(mut self) -> Result<PathBuf, CaptureError> {
        match fs::metadata(&self.partial) {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return Err(CaptureError::StorageError(format!(
                    "{} was not written",
                    self.target.display()
                )))
            }
        }
        fs::rename(&self.partial, &self.target).map_err(|e| {
            CaptureError::StorageError(format!("failed to move {} into place: {}", self.target.display(), e))
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// `dir/name.ext` → `dir/name.partial.ext`. The extension is kept so
/// encoders can infer the container from it.
pub fn partial_path(target: &Path) -> PathBuf {
    let stem = target.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspaces_are_unique_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let settings = EncoderSettings::default();

        let first = FlushWorkspace::create(root.path(), &settings).unwrap();
        let second = FlushWorkspace::create(root.path(), &settings).unwrap();
        assert_ne!(first.dir(), second.dir());
        assert_eq!(first.video_path().file_name().unwrap(), "screen.avi");
        assert_eq!(first.audio_path(StreamKind::Mic).file_name().unwrap(), "mic.wav");
        assert_eq!(first.combined_audio_path().file_name().unwrap(), "combined.mp3");

        fs::write(first.mixed_path(), b"pcm").unwrap();
        let dir = first.dir().to_path_buf();
        drop(first);
        assert!(!dir.exists());
        assert!(second.dir().exists());
    }

    #[test]
    fn remove_files_ignores_missing() {
        let root = tempfile::tempdir().unwrap();
        let ws = FlushWorkspace::create(root.path(), &EncoderSettings::default()).unwrap();
        fs::write(ws.mixed_path(), b"pcm").unwrap();

        let removed = ws.remove_files(&[ws.mixed_path(), ws.video_path()]);
        assert_eq!(removed, 1);
        assert!(ws.files().is_empty());
    }

    #[test]
    fn partial_names_keep_extension() {
        assert_eq!(partial_path(Path::new("/tmp/x/mic.wav")), PathBuf::from("/tmp/x/mic.partial.wav"));
        assert_eq!(partial_path(Path::new("out")), PathBuf::from("out.partial"));
    }

    #[test]
    fn uncommitted_partial_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("screen.avi");
        {
            let partial = PartialFile::new(&target);
            fs::write(partial.path(), b"half a frame").unwrap();
        }
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn commit_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mic.wav");
        let partial = PartialFile::new(&target);
        fs::write(partial.path(), b"RIFF").unwrap();

        assert_eq!(partial.commit().unwrap(), target);
        assert!(target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn empty_partial_does_not_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mic.wav");
        let partial = PartialFile::new(&target);
        fs::write(partial.path(), b"").unwrap();

        assert!(matches!(partial.commit(), Err(CaptureError::StorageError(_))));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }
}
