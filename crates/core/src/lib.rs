//! Taskstack core data models.
//!
//! This crate defines the records shared by the layered task scheduler and
//! the quality-gated execution pipeline.

#![warn(missing_docs)]

// Core identities
mod id;

// Scheduling
mod task;
mod layer;
mod pointer;
mod message;

// Execution
mod execution;

// Re-exports
pub use id::*;

pub use task::{Task, TaskStatus, TransitionError};
pub use layer::{Hook, Layer, LayerEntry};
pub use pointer::{ExecutionPointer, Position, Slot};
pub use message::{ReadStatus, UserMessage};
pub use execution::{
    ArtifactHandle, ExecutionRecord, ExecutionStatus, FailureDiagnostic, FailureStage,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
