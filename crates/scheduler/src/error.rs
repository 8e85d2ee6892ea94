//! Scheduler errors.

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors returned by the task stack.
///
/// None of these are retried: they describe caller misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Target is at or behind the execution pointer
    #[error("Frozen: {0}")]
    Frozen(String),

    /// Unknown task or layer
    #[error("Not found: {0}")]
    NotFound(String),

    /// No unit exists after the pointer
    #[error("Stack exhausted: no unit after the execution pointer")]
    Exhausted,

    /// Request is well-formed but not applicable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SchedulerError {
    pub(crate) fn task_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("task {}", id))
    }

    pub(crate) fn layer_not_found(index: usize) -> Self {
        Self::NotFound(format!("layer {}", index))
    }
}
