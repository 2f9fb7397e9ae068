//! Bounded polling for asynchronous analysis jobs.
//!
//! The analysis backend runs jobs asynchronously and offers no push
//! notification, so the only synchronization mechanism is to poll the job
//! handle on a fixed cadence with a hard ceiling on attempts.

use async_trait::async_trait;

use crate::{
    error::PipelineError,
    ocr::{JobHandle, JobStatus, OcrBackend, Page},
    prelude::*,
};

/// How often and how long to poll an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of status checks before giving up.
    pub max_attempts: u32,
    /// Delay between consecutive status checks.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollPolicy {
    /// Worst-case wall-clock time a poll under this policy can take,
    /// ignoring per-query latency.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Suspends the calling task for a while.
///
/// Split out of the polling loop so tests can observe sleeps instead of
/// taking them.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// The real clock: `tokio::time::sleep`, which suspends only this task.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll `handle` until the job reaches a terminal state.
///
/// Terminal success and terminal failure return immediately, with no
/// further status checks. A job still pending after `max_attempts` checks
/// fails with [`PipelineError::PollTimedOut`]. Only the `Pending` state is
/// retried; errors from the backend surface as-is.
#[instrument(level = "debug", skip_all, fields(max_attempts = policy.max_attempts))]
pub async fn poll_to_completion(
    backend: &dyn OcrBackend,
    handle: &JobHandle,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
) -> Result<Vec<Page>, PipelineError> {
    for attempt in 1..=policy.max_attempts {
        match backend.job_status(handle).await? {
            JobStatus::Succeeded(pages) => {
                debug!(attempt, page_count = pages.len(), "Analysis finished");
                return Ok(pages);
            }
            JobStatus::Failed(reason) => {
                // Failure is not transient; retrying a failed job cannot help.
                return Err(PipelineError::AnalysisFailed(reason));
            }
            JobStatus::Pending => {
                trace!(attempt, "Analysis still running");
                // No sleep after the final check; we already know the answer.
                if attempt < policy.max_attempts {
                    sleeper.sleep(policy.interval).await;
                }
            }
        }
    }
    Err(PipelineError::PollTimedOut {
        attempts: policy.max_attempts,
    })
}
