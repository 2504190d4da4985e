//! Error type shared by pipeline stages and entry points.
//!
//! Validation failures (missing entities, conflicts, unmet preconditions) are
//! distinguished from provider/storage failures: the former are rejected
//! before any mutation and surfaced to the caller with a specific reason,
//! the latter fail the stage and mark the owning analysis as failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation conflicts with existing state (e.g. a second active
    /// analysis for the same user and company).
    #[error("{0}")]
    Conflict(String),

    /// A precondition for the operation is not met (e.g. no accepted
    /// recommendations before strategy generation).
    #[error("{0}")]
    Precondition(String),

    /// Provider, storage, or any other non-validation failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether this error belongs to the validation class (no mutation
    /// happened, reject-with-reason semantics).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::NotFound(_) | PipelineError::Conflict(_) | PipelineError::Precondition(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
