//! Evaluation errors.

/// An evaluator tier could not produce a verdict.
///
/// This is distinct from a [`crate::GateFailure`], where the tier ran and
/// rejected the output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// The model call behind a tier failed
    #[error("Model error: {0}")]
    Model(String),

    /// The model answered with something that is not a rubric verdict
    #[error("Malformed verdict: {0}")]
    Malformed(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<crate::model::ModelError> for EvaluationError {
    fn from(e: crate::model::ModelError) -> Self {
        EvaluationError::Model(e.to_string())
    }
}
