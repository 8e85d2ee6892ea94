//! Execution record model - one record per pipeline dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::id::{ArtifactId, ExecutionId, TaskId};
use crate::Time;

/// Record of a single dispatch through the pipeline.
///
/// Retries happen inside one record. Once the status is terminal the record
/// is never touched again; a new dispatch creates a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique identifier
    pub id: ExecutionId,

    /// Executor the task was dispatched to
    pub executor_id: String,

    /// Task being executed
    pub task_id: TaskId,

    /// Current status
    pub status: ExecutionStatus,

    /// Input of the latest attempt
    pub input: Value,

    /// Normalized output, present once completed
    pub output: Option<Value>,

    /// Diagnostic of the last failed attempt
    pub error: Option<FailureDiagnostic>,

    /// Attempts made so far
    pub attempts: u32,

    /// Handles of artifacts stored in the workspace
    #[serde(default)]
    pub artifacts: Vec<ArtifactHandle>,

    /// When the first attempt started
    pub started_at: Option<Time>,

    /// When the record became terminal
    pub completed_at: Option<Time>,

    /// When created
    pub created_at: Time,
}

impl ExecutionRecord {
    /// Create a pending record.
    pub fn new(executor_id: impl Into<String>, task_id: TaskId) -> Self {
        Self {
            id: ExecutionId::new(),
            executor_id: executor_id.into(),
            task_id,
            status: ExecutionStatus::Pending,
            input: Value::Null,
            output: None,
            error: None,
            attempts: 0,
            artifacts: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Mark the record as running.
    pub fn start(&mut self) {
        if self.status == ExecutionStatus::Pending {
            self.status = ExecutionStatus::InProgress;
            self.started_at = Some(chrono::Utc::now());
        }
    }

    /// Count a new attempt with its freshly built input.
    pub fn begin_attempt(&mut self, input: Value) {
        self.attempts += 1;
        self.input = input;
    }

    /// Finish successfully.
    pub fn complete(mut self, output: Value, artifacts: Vec<ArtifactHandle>) -> Self {
        self.status = ExecutionStatus::Completed;
        self.output = Some(output);
        self.artifacts = artifacts;
        self.error = None;
        self.completed_at = Some(chrono::Utc::now());
        self
    }

    /// Finish unsuccessfully with the last attempt's diagnostic.
    pub fn fail(mut self, diagnostic: FailureDiagnostic) -> Self {
        self.status = ExecutionStatus::Failed;
        self.error = Some(diagnostic);
        self.completed_at = Some(chrono::Utc::now());
        self
    }

    /// Whether the record has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Dispatch lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created, not yet running
    Pending,
    /// Attempts in progress
    InProgress,
    /// All quality tiers passed
    Completed,
    /// Attempts exhausted or unrecoverable failure
    Failed,
}

impl ExecutionStatus {
    /// Whether the status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "PENDING"),
            ExecutionStatus::InProgress => write!(f, "IN_PROGRESS"),
            ExecutionStatus::Completed => write!(f, "COMPLETED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Where an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Input could not be assembled
    Input,
    /// Executor returned an error
    Execution,
    /// Executor, materializer or an evaluator tier exceeded the attempt bound
    Timeout,
    /// Tier 1 rejected the output
    Structural,
    /// Tier 2 rejected the output
    Semantic,
    /// Artifacts could not be produced
    Materialization,
    /// Tier 3 rejected the artifacts
    Artifact,
    /// An evaluator tier could not run
    Evaluation,
    /// Artifacts could not be stored
    Workspace,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureStage::Input => "input",
            FailureStage::Execution => "execution",
            FailureStage::Timeout => "timeout",
            FailureStage::Structural => "structural",
            FailureStage::Semantic => "semantic",
            FailureStage::Materialization => "materialization",
            FailureStage::Artifact => "artifact",
            FailureStage::Evaluation => "evaluation",
            FailureStage::Workspace => "workspace",
        };
        f.write_str(name)
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDiagnostic {
    /// Failing stage
    pub stage: FailureStage,

    /// Attempt number (1-based)
    pub attempt: u32,

    /// Summary line
    pub message: String,

    /// Individual findings behind the summary
    #[serde(default)]
    pub details: Vec<String>,
}

impl FailureDiagnostic {
    /// Create a diagnostic without details.
    pub fn new(stage: FailureStage, attempt: u32, message: impl Into<String>) -> Self {
        Self {
            stage,
            attempt,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Attach details.
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for FailureDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} @ attempt {}] {}", self.stage, self.attempt, self.message)
    }
}

/// Reference to an artifact stored in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Unique identifier
    pub id: ArtifactId,

    /// Where the workspace put it
    pub uri: String,

    /// Logical artifact name
    pub name: String,

    /// MIME type or extension hint
    pub media_type: String,

    /// Size in bytes
    pub size: u64,
}
