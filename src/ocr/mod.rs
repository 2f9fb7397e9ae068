//! Document analysis (OCR) backend interface.

pub mod azure;
pub mod poll;

use async_trait::async_trait;

use crate::error::PipelineError;

/// The status-poll address of one in-flight analysis job.
///
/// Single use: created by [`OcrBackend::submit`], owned by the poller until
/// the job reaches a terminal state, never reused across documents.
#[derive(Debug, Clone)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wrap a status-poll address returned by the backend.
    pub fn new(poll_url: impl Into<String>) -> Self {
        Self(poll_url.into())
    }

    /// The address to query for job status.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of recognized text. Lines are kept in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub lines: Vec<String>,
}

impl Page {
    /// Build a page from anything line-shaped. Mostly a test convenience.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where an analysis job currently stands.
///
/// `Pending` is purely a polling-loop state; the pipeline caller only ever
/// sees the terminal outcomes.
#[derive(Debug, Clone)]
pub enum JobStatus {
    /// The backend is still working on the job.
    Pending,
    /// The job finished; recognized pages in reading order.
    Succeeded(Vec<Page>),
    /// The backend gave up on the job.
    Failed(String),
}

/// A remote OCR service that runs analysis jobs asynchronously.
///
/// The backend exposes no push notification, so callers submit a job and
/// then poll the returned handle (see [`poll::poll_to_completion`]).
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Start analyzing the document behind `source_url`.
    ///
    /// `source_url` must stay readable by the backend for the whole polling
    /// budget, or late status checks will fail spuriously.
    async fn submit(&self, source_url: &str) -> Result<JobHandle, PipelineError>;

    /// Fetch the current status of an in-flight job.
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, PipelineError>;
}
