//! The pipeline's error taxonomy.
//!
//! Each variant is a distinct caller-facing outcome. Stages never retry on
//! error; whatever a stage reports is surfaced verbatim through the
//! orchestrator.

use thiserror::Error;

/// Everything that can go wrong while turning a document into narration.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller handed us a missing or malformed document reference.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The analysis backend refused to create a job for the document.
    #[error("could not submit document for analysis")]
    Submission(#[source] anyhow::Error),

    /// The analysis job never reached a terminal state within our budget.
    #[error("document analysis did not finish after {attempts} status checks")]
    PollTimedOut {
        /// How many status checks we made before giving up.
        attempts: u32,
    },

    /// The analysis backend reported the job as failed.
    #[error("document analysis failed: {0}")]
    AnalysisFailed(String),

    /// Analysis finished but recognized no text at all. Distinct from
    /// [`PipelineError::AnalysisFailed`]: the job itself succeeded.
    #[error("no text could be extracted from the document")]
    NoTextExtracted,

    /// The speech backend rejected the request or the call itself failed.
    #[error("speech synthesis failed")]
    Synthesis(#[source] anyhow::Error),

    /// The finished audio could not be stored durably.
    #[error("could not persist synthesized audio")]
    Persistence(#[source] anyhow::Error),

    /// A bug on our side, not a remote condition.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl PipelineError {
    /// Process exit code reported by the CLI boundary.
    ///
    /// Caller mistakes and empty documents get their own codes so scripts
    /// can tell them apart from remote-service failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::InvalidInput(_) => 2,
            PipelineError::NoTextExtracted => 3,
            _ => 1,
        }
    }
}
