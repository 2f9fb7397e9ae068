//! OCR via the Azure Document Intelligence `prebuilt-read` model.
//!
//! Submission is a `POST` to the `:analyze` endpoint, which answers with an
//! `operation-location` header naming the status-poll URL. Status checks are
//! plain `GET`s against that URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::OcrConfig,
    error::PipelineError,
    ocr::{JobHandle, JobStatus, OcrBackend, Page},
    prelude::*,
};

/// API version the `prebuilt-read` request pins.
const API_VERSION: &str = "2023-07-31";

/// Header carrying the subscription key on every request.
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Document Intelligence client.
pub struct AzureDocIntel {
    client: reqwest::Client,
    endpoint: String,
    key: String,
}

impl AzureDocIntel {
    /// Create a client from explicit configuration.
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            key: config.key.clone(),
        }
    }

    /// URL used to start a `prebuilt-read` analysis job.
    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/prebuilt-read:analyze?api-version={}",
            self.endpoint, API_VERSION
        )
    }
}

/// Request body for `:analyze`.
#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    #[serde(rename = "urlSource")]
    url_source: &'a str,
}

/// Status document returned by the poll URL.
#[derive(Debug, Deserialize)]
struct AnalyzeStatus {
    status: String,
    #[serde(default, rename = "analyzeResult")]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<AnalyzeErrorBody>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<AnalyzePage>,
}

#[derive(Debug, Deserialize)]
struct AnalyzePage {
    #[serde(default)]
    lines: Vec<AnalyzeLine>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeLine {
    content: String,
}

#[async_trait]
impl OcrBackend for AzureDocIntel {
    #[instrument(level = "debug", skip_all)]
    async fn submit(&self, source_url: &str) -> Result<JobHandle, PipelineError> {
        let response = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.key)
            .json(&AnalyzeRequest {
                url_source: source_url,
            })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::Submission(err.into()))?;

        let operation_location = response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                PipelineError::Submission(anyhow!(
                    "analysis response is missing the operation-location header"
                ))
            })?;
        debug!(%operation_location, "Analysis job created");
        Ok(JobHandle::new(operation_location))
    }

    #[instrument(level = "trace", skip_all)]
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, PipelineError> {
        // A transport failure here is not a terminal job state, but we have
        // no way to tell a dead job from a dead network, so report it as an
        // analysis failure rather than polling forever.
        let status: AnalyzeStatus = self
            .client
            .get(handle.as_str())
            .header(KEY_HEADER, &self.key)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::AnalysisFailed(format!("status check failed: {err}")))?
            .json()
            .await
            .map_err(|err| {
                PipelineError::AnalysisFailed(format!("unreadable status response: {err}"))
            })?;

        match status.status.as_str() {
            "succeeded" => {
                let pages = status
                    .analyze_result
                    .map(|result| {
                        result
                            .pages
                            .into_iter()
                            .map(|page| Page {
                                lines: page.lines.into_iter().map(|line| line.content).collect(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(JobStatus::Succeeded(pages))
            }
            "failed" => {
                let reason = status
                    .error
                    .and_then(|err| err.message)
                    .unwrap_or_else(|| "backend reported failure without details".to_owned());
                Ok(JobStatus::Failed(reason))
            }
            // "notStarted", "running", and anything the API adds later.
            other => {
                trace!(status = other, "Analysis still in progress");
                Ok(JobStatus::Pending)
            }
        }
    }
}
