//! Blob storage over the Azure Blob REST API with caller-supplied SAS
//! tokens.
//!
//! We deliberately avoid the account key here: the operator mints one SAS
//! token per container (read for sources, create+write for audio) and this
//! client only appends them to URLs.

use std::time::SystemTime;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    config::StorageConfig,
    error::PipelineError,
    prelude::*,
    storage::{BlobStore, PersistedAudio},
};

/// Azure Blob storage client.
pub struct AzureBlobStore {
    client: reqwest::Client,
    account: String,
    source_container: String,
    source_sas: String,
    audio_container: String,
    audio_sas: String,
}

impl AzureBlobStore {
    /// Create a client from explicit configuration.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            account: config.account.clone(),
            source_container: config.source_container.clone(),
            source_sas: trim_sas(&config.source_sas),
            audio_container: config.audio_container.clone(),
            audio_sas: trim_sas(&config.audio_sas),
        }
    }

    fn container_url(&self, container: &str) -> String {
        format!("https://{}.blob.core.windows.net/{}", self.account, container)
    }
}

/// SAS tokens are pasted from the portal with or without a leading `?`.
fn trim_sas(sas: &str) -> String {
    sas.trim_start_matches('?').to_owned()
}

/// Fail when the SAS token's `se=` expiry does not reach `now + ttl`.
///
/// A token without a parseable expiry gets a debug note and the benefit of
/// the doubt; the backend will still reject it if it is actually stale.
fn check_sas_covers(sas: &str, ttl: Duration) -> Result<(), PipelineError> {
    let Some(expiry) = sas.split('&').find_map(|pair| pair.strip_prefix("se=")) else {
        debug!(
            ttl_secs = ttl.as_secs(),
            "Source SAS has no se field; its expiry must cover this TTL"
        );
        return Ok(());
    };
    // Portal-minted tokens percent-encode the colons in the timestamp.
    let expiry = expiry.replace("%3A", ":").replace("%3a", ":");
    let Ok(expires_at) = humantime::parse_rfc3339(&expiry) else {
        debug!(se = %expiry, "Unparseable SAS expiry; assuming it covers the TTL");
        return Ok(());
    };
    if expires_at < SystemTime::now() + ttl {
        return Err(PipelineError::InvalidInput(format!(
            "source SAS expires at {expiry}, inside the {}s polling budget",
            ttl.as_secs()
        )));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn read_reference(
        &self,
        document_id: &str,
        ttl: Duration,
    ) -> Result<String, PipelineError> {
        // With a pre-minted SAS we cannot adjust the expiry per request, so
        // reject a token that cannot outlive `ttl` up front instead of
        // letting late status checks fail spuriously.
        check_sas_covers(&self.source_sas, ttl)?;
        Ok(format!(
            "{}/{}?{}",
            self.container_url(&self.source_container),
            document_id,
            self.source_sas
        ))
    }

    #[instrument(level = "debug", skip_all)]
    async fn provision(&self) -> Result<(), PipelineError> {
        let url = format!(
            "{}?restype=container&{}",
            self.container_url(&self.audio_container),
            self.audio_sas
        );
        let response = self
            .client
            .put(url)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|err| PipelineError::Persistence(err.into()))?;

        // 409 means the container already exists, which is what we want.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        response
            .error_for_status()
            .map_err(|err| PipelineError::Persistence(err.into()))?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all)]
    async fn persist(
        &self,
        audio: &Path,
        content_type: &str,
    ) -> Result<PersistedAudio, PipelineError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|err| PipelineError::Persistence(err.into()))?;

        let blob_name = format!("speech-{}.mp3", Uuid::new_v4());
        let blob_url = format!(
            "{}/{}",
            self.container_url(&self.audio_container),
            blob_name
        );
        self.client
            .put(format!("{}?{}", blob_url, self.audio_sas))
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::Persistence(err.into()))?;

        info!(%blob_name, "Persisted synthesized audio");
        Ok(PersistedAudio {
            blob_name,
            url: blob_url,
        })
    }
}
