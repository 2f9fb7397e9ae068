//! Scoped local audio artifact.

use tempfile::NamedTempFile;

use crate::{error::PipelineError, prelude::*};

/// The ephemeral MP3 sink between synthesis and persistence.
///
/// Owned by the orchestrator. The underlying file is removed when this
/// value is dropped, so every exit path releases it; [`discard`] exists so
/// the happy path can log a failed removal instead of ignoring it.
///
/// [`discard`]: ScopedAudioFile::discard
pub struct ScopedAudioFile {
    file: NamedTempFile,
}

impl ScopedAudioFile {
    /// Allocate an empty temp file with an `.mp3` suffix.
    pub fn new() -> Result<Self, PipelineError> {
        let file = tempfile::Builder::new()
            .prefix("readaloud-")
            .suffix(".mp3")
            .tempfile()
            .map_err(|err| PipelineError::Internal(err.into()))?;
        trace!(path = %file.path().display(), "Allocated ephemeral audio file");
        Ok(Self { file })
    }

    /// Where synthesis should write its output.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now. Failure is logged and never propagated, so
    /// cleanup cannot change the pipeline's reported outcome.
    pub fn discard(self) {
        if let Err(err) = self.file.close() {
            warn!("Could not remove ephemeral audio file: {err}");
        }
    }
}
