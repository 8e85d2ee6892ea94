//! Workspace trait abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskstack_core::{ArtifactHandle, LogEntryId, TaskId, Time};

/// Error type for workspace operations.
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Errors that can occur while writing to a workspace.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Descriptive data stored alongside an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Logical name
    pub name: String,

    /// MIME type or extension hint
    pub media_type: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Executor that produced it
    pub created_by: Option<String>,

    /// Task it belongs to
    pub task_id: Option<TaskId>,

    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ArtifactMetadata {
    /// Create metadata for a named artifact.
    pub fn new(name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            ..Default::default()
        }
    }

    /// Set the producing executor and task.
    pub fn produced_by(mut self, executor_id: impl Into<String>, task_id: TaskId) -> Self {
        self.created_by = Some(executor_id.into());
        self.task_id = Some(task_id);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One line of the workspace's operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier
    pub id: LogEntryId,

    /// What happened, e.g. `dispatch_completed`
    pub operation: String,

    /// Kind of resource touched
    pub resource_kind: String,

    /// Id of the resource touched
    pub resource_id: String,

    /// Executor involved
    pub executor_id: Option<String>,

    /// Task involved
    pub task_id: Option<TaskId>,

    /// Structured details
    #[serde(default)]
    pub details: Value,

    /// When recorded
    pub created_at: Time,
}

impl LogEntry {
    /// Create an entry.
    pub fn new(
        operation: impl Into<String>,
        resource_kind: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            operation: operation.into(),
            resource_kind: resource_kind.into(),
            resource_id: resource_id.into(),
            executor_id: None,
            task_id: None,
            details: Value::Null,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set executor and task.
    pub fn for_dispatch(mut self, executor_id: impl Into<String>, task_id: TaskId) -> Self {
        self.executor_id = Some(executor_id.into());
        self.task_id = Some(task_id);
        self
    }

    /// Set details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Write-only sink for pipeline output.
///
/// The pipeline never reads back from a workspace during a dispatch.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Store an artifact and return a handle to it.
    async fn store_artifact(&self, bytes: Vec<u8>, metadata: ArtifactMetadata) -> Result<ArtifactHandle>;

    /// Append a log entry.
    async fn append_log(&self, entry: LogEntry) -> Result<()>;
}
