//! The `narrate` subcommand.

use clap::Args;

use crate::{
    config::{OcrConfig, PipelineConfig, SpeechConfig, StorageConfig},
    ocr::{azure::AzureDocIntel, poll::PollPolicy},
    pipeline::Pipeline,
    prelude::*,
    storage::azure::AzureBlobStore,
    tts::azure::AzureSpeech,
};

/// Options for the `narrate` subcommand.
#[derive(Debug, Args)]
pub struct NarrateOpts {
    /// Blob name of the uploaded document to narrate.
    pub document: String,

    /// Synthesis voice profile.
    #[clap(long)]
    pub voice: Option<String>,

    /// Maximum number of characters sent to speech synthesis.
    #[clap(long, default_value = "5000")]
    pub max_chars: usize,

    /// How many times to check the analysis job before giving up.
    #[clap(long, default_value = "30")]
    pub poll_attempts: u32,

    /// Delay between analysis status checks (e.g. "1s", "500ms").
    #[clap(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,
}

/// Run the pipeline for one document and print the summary as JSON.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_narrate(opts: &NarrateOpts) -> Result<()> {
    let ocr_config = OcrConfig::from_env()?;
    let speech_config = SpeechConfig::from_env()?;
    let storage_config = StorageConfig::from_env()?;

    let config = PipelineConfig {
        max_chars: opts.max_chars,
        poll: PollPolicy {
            max_attempts: opts.poll_attempts,
            interval: opts.poll_interval,
        },
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(
        Arc::new(AzureDocIntel::new(&ocr_config)),
        Arc::new(AzureSpeech::new(&speech_config)),
        Arc::new(AzureBlobStore::new(&storage_config)),
        config,
    );

    let summary = pipeline
        .run(&opts.document, opts.voice.as_deref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
