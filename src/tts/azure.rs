//! Speech synthesis via the Azure Speech REST API.
//!
//! One `POST` with an SSML body; the response body is the finished MP3.

use async_trait::async_trait;

use crate::{config::SpeechConfig, error::PipelineError, prelude::*, tts::TtsBackend};

/// Header carrying the subscription key.
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// MP3 output, mono, good enough for narration.
const OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";

/// Azure Speech synthesis client.
pub struct AzureSpeech {
    client: reqwest::Client,
    region: String,
    key: String,
}

impl AzureSpeech {
    /// Create a client from explicit configuration.
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            region: config.region.clone(),
            key: config.key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }
}

/// Wrap `text` in the minimal SSML envelope the API requires.
fn ssml(text: &str, voice: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='en-US'><voice name='{}'>{}</voice></speak>",
        xml_escape(voice),
        xml_escape(text)
    )
}

/// Escape the five XML special characters.
fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl TtsBackend for AzureSpeech {
    #[instrument(level = "debug", skip_all, fields(voice = %voice, chars = text.chars().count()))]
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out: &Path,
    ) -> Result<(), PipelineError> {
        if text.is_empty() {
            return Err(PipelineError::Synthesis(anyhow!(
                "refusing to synthesize empty text"
            )));
        }

        let audio = self
            .client
            .post(self.endpoint())
            .header(KEY_HEADER, &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(ssml(text, voice))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::Synthesis(err.into()))?
            .bytes()
            .await
            .map_err(|err| PipelineError::Synthesis(err.into()))?;

        debug!(bytes = audio.len(), "Received synthesized audio");
        tokio::fs::write(out, &audio)
            .await
            .map_err(|err| PipelineError::Synthesis(err.into()))
    }
}
