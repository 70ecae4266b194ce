// Request-level errors
// Component errors (retrieval, transform, scoring) are recovered where they happen; only these
// two reach the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad caller input. Reported as a validation failure, never retried.
    #[error("{0}")]
    InputValidation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InputValidation(_))
    }
}
