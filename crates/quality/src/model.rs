//! Model client contract.

use async_trait::async_trait;
use serde_json::Value;

/// Error raised by a model backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// A model backend that answers with JSON.
///
/// Executors and rubric evaluation both go through this; the transport
/// behind it is out of scope here.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a system and a user prompt, get a JSON answer back.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, ModelError>;
}
