//! Pipeline errors.

use std::time::Duration;

use taskstack_core::FailureStage;
use taskstack_quality::ModelError;

/// Result type for dispatch.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by [`crate::Pipeline::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// No descriptor is registered under this id
    #[error("Unknown executor: {0}")]
    UnknownExecutor(String),
}

/// An attempt failed before its output could be evaluated.
///
/// Recovered by the retry loop; never returned from dispatch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// The executor reported failure
    #[error("Executor failed: {0}")]
    Failed(String),

    /// The input could not be built or decoded
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The model call inside the executor failed
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Artifacts could not be produced
    #[error("Materialization failed: {0}")]
    Materialization(String),

    /// The call exceeded the attempt bound
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl ExecutionError {
    /// Stage recorded in the failure diagnostic.
    pub fn stage(&self) -> FailureStage {
        match self {
            ExecutionError::Failed(_) | ExecutionError::Model(_) => FailureStage::Execution,
            ExecutionError::InvalidInput(_) => FailureStage::Input,
            ExecutionError::Materialization(_) => FailureStage::Materialization,
            ExecutionError::Timeout(_) => FailureStage::Timeout,
        }
    }
}
