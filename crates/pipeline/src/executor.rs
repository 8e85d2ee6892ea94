//! Executor and materializer contracts.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use taskstack_core::TaskId;
use taskstack_quality::MaterializedArtifact;

use crate::error::ExecutionError;

/// Outputs of earlier executors in a task's chain: executor id, then asset
/// key, then the asset.
pub type PriorAssets = BTreeMap<String, BTreeMap<String, Value>>;

/// Everything an input builder may look at for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct InputContext<'a> {
    /// Task being executed
    pub task_id: TaskId,
    /// Assets produced upstream
    pub prior_assets: &'a PriorAssets,
    /// Caller-supplied inputs
    pub extra_inputs: &'a Value,
    /// Previous attempt's failure summary, only for descriptors that opt in
    pub rework_notes: Option<&'a str>,
    /// Attempt number (1-based)
    pub attempt: u32,
}

/// A single call to a generation backend.
///
/// Implementations are stateless per call. The pipeline may abandon a call
/// on timeout; whatever it returns afterwards is discarded.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run on a JSON input and return a JSON output.
    async fn run(&self, input: Value) -> Result<Value, ExecutionError>;
}

/// An executor with typed input and output.
///
/// Wrap in [`Typed`] to register it.
#[async_trait]
pub trait TypedExecutor: Send + Sync {
    /// Decoded input
    type Input: DeserializeOwned + Send;
    /// Output before encoding
    type Output: Serialize + Send;

    /// Run on a decoded input.
    async fn run(&self, input: Self::Input) -> Result<Self::Output, ExecutionError>;
}

/// Adapter from [`TypedExecutor`] to [`Executor`].
pub struct Typed<E>(pub E);

#[async_trait]
impl<E> Executor for Typed<E>
where
    E: TypedExecutor,
{
    async fn run(&self, input: Value) -> Result<Value, ExecutionError> {
        let decoded: E::Input = serde_json::from_value(input)
            .map_err(|e| ExecutionError::InvalidInput(e.to_string()))?;
        let output = self.0.run(decoded).await?;
        serde_json::to_value(output)
            .map_err(|e| ExecutionError::Failed(format!("unserializable output: {}", e)))
    }
}

/// Turns an accepted output into binary artifacts.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Produce the artifacts for `output`.
    async fn materialize(
        &self,
        output: &Value,
        prior_assets: &PriorAssets,
    ) -> Result<Vec<MaterializedArtifact>, ExecutionError>;
}
