//! Speech synthesis backend interface.

pub mod azure;

use async_trait::async_trait;

use crate::{error::PipelineError, prelude::*};

/// A remote TTS service that renders text as speech audio.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Render `text` with the given voice, writing the finished audio to
    /// `out`.
    ///
    /// `out` is an ephemeral sink owned by the caller; this component never
    /// persists or deletes it.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out: &Path,
    ) -> Result<(), PipelineError>;
}
