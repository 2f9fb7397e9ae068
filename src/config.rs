//! Explicit configuration for the pipeline and its remote collaborators.
//!
//! Core logic never reads the environment. Everything ambient is resolved
//! here, at the CLI boundary, and passed into constructors, which is what
//! lets the tests substitute doubles for every backend.

use std::env;

use crate::{ocr::poll::PollPolicy, prelude::*};

/// Voice profile used when the caller does not pick one.
pub const DEFAULT_VOICE: &str = "en-US-JennyNeural";

/// Knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of characters forwarded to speech synthesis.
    pub max_chars: usize,
    /// Polling cadence and budget for the analysis job.
    pub poll: PollPolicy,
    /// Voice profile used when the caller does not pick one.
    pub default_voice: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chars: 5000,
            poll: PollPolicy::default(),
            default_voice: DEFAULT_VOICE.to_owned(),
        }
    }
}

/// Connection details for the document analysis service.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Service endpoint, e.g. `https://<name>.cognitiveservices.azure.com`.
    pub endpoint: String,
    /// Subscription key.
    pub key: String,
}

impl OcrConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: require_env("DOCINTEL_ENDPOINT")?,
            key: require_env("DOCINTEL_KEY")?,
        })
    }
}

/// Connection details for the speech synthesis service.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Service region, e.g. `westeurope`.
    pub region: String,
    /// Subscription key.
    pub key: String,
}

impl SpeechConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            region: require_env("SPEECH_REGION")?,
            key: require_env("SPEECH_KEY")?,
        })
    }
}

/// Connection details for blob storage.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage account name.
    pub account: String,
    /// Container holding uploaded source documents.
    pub source_container: String,
    /// Read SAS token for the source container. Must outlive the polling
    /// budget, or late status checks fail spuriously.
    pub source_sas: String,
    /// Container receiving finished audio.
    pub audio_container: String,
    /// Create+write SAS token for the audio container.
    pub audio_sas: String,
}

impl StorageConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account: require_env("STORAGE_ACCOUNT_NAME")?,
            source_container: env_or("STORAGE_SOURCE_CONTAINER", "books"),
            source_sas: require_env("STORAGE_SOURCE_SAS")?,
            audio_container: env_or("STORAGE_AUDIO_CONTAINER", "audio"),
            audio_sas: require_env("STORAGE_AUDIO_SAS")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing environment variable {name}"))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}
