//! Task model - a discrete unit of work scheduled by the stack.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::id::TaskId;
use crate::Time;

/// A task held by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Opaque structured payload supplied by the planner
    pub description: Value,

    /// Current status
    pub status: TaskStatus,

    /// Free-form progress mapping
    #[serde(default)]
    pub progress: Map<String, Value>,

    /// Result payload, set once the task has been executed
    pub results: Option<Value>,

    /// When created
    pub created_at: Time,

    /// Last update time
    pub updated_at: Time,
}

impl Task {
    /// Create a new pending task.
    pub fn new(description: Value) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TaskId::new(),
            description,
            status: TaskStatus::Pending,
            progress: Map::new(),
            results: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the task to `next`, enforcing the monotonic transition rule.
    ///
    /// Re-applying the current status is accepted and only bumps `updated_at`.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Bump the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting to be scheduled
    Pending,
    /// Dispatched and running
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Replaced before it was reached by the pointer
    Cancelled,
}

impl TaskStatus {
    /// Whether `next` is reachable from this status.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    /// Status before the attempted move
    pub from: TaskStatus,
    /// Requested status
    pub to: TaskStatus,
}
