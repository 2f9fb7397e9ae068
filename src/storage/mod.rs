//! Durable blob storage collaborator.
//!
//! The pipeline treats storage as external: it needs a time-limited read
//! reference for the source document and a place to put the finished audio,
//! nothing more.

pub mod azure;

use async_trait::async_trait;
use serde::Serialize;

use crate::{error::PipelineError, prelude::*};

/// Where a durably stored audio artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedAudio {
    /// The blob name within the audio container.
    pub blob_name: String,
    /// A stable (non-expiring) URL for the blob.
    pub url: String,
}

/// Blob storage holding source documents and finished audio.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// A read reference to a stored source document, valid for at least
    /// `ttl`. The analysis backend fetches the document through this URL.
    async fn read_reference(
        &self,
        document_id: &str,
        ttl: Duration,
    ) -> Result<String, PipelineError>;

    /// Create the audio container if it does not already exist.
    async fn provision(&self) -> Result<(), PipelineError>;

    /// Store the audio file at `audio` durably and return where it landed.
    async fn persist(
        &self,
        audio: &Path,
        content_type: &str,
    ) -> Result<PersistedAudio, PipelineError>;
}
