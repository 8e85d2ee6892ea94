//! Evaluator capability.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EvaluationError;
use crate::model::ModelClient;
use crate::rubric::{self, Dimension, DimensionScore};

/// Upstream assets visible to an evaluator, keyed by asset key.
pub type Upstream = BTreeMap<String, Value>;

/// An artifact produced in memory by a materializer, not yet stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedArtifact {
    /// Logical name
    pub name: String,

    /// Raw content
    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// MIME type or extension hint
    pub media_type: String,

    /// JSON pointer into the output where the stored URI belongs
    pub slot: Option<String>,
}

impl MaterializedArtifact {
    /// Create an artifact with no output slot.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes,
            media_type: media_type.into(),
            slot: None,
        }
    }

    /// Point the artifact at a location in the output.
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }
}

/// Verdict of the artifact tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReport {
    /// Consistency errors between output and artifacts
    pub errors: Vec<String>,

    /// Scored properties, such as success rates
    pub dimensions: Vec<DimensionScore>,
}

/// Three-tier evaluator for one executor's output.
///
/// Only [`Evaluator::name`] is required. The defaults accept everything in
/// tier 1, score [`Evaluator::dimensions`] with the model in tier 2 (an
/// empty rubric skips the call), and accept everything in tier 3.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Tier 1: structural errors in `output`. Empty means pass.
    ///
    /// Runs on the output alone plus upstream assets; must not call out.
    fn check_structure(&self, _output: &Value, _upstream: &Upstream) -> Vec<String> {
        Vec::new()
    }

    /// Rubric dimensions for tier 2.
    fn dimensions(&self) -> Vec<Dimension> {
        Vec::new()
    }

    /// Extra context placed above the content in the rubric prompt.
    fn semantic_context(&self, _output: &Value, _upstream: &Upstream) -> String {
        String::new()
    }

    /// Tier 2: score `output` against the rubric.
    async fn check_semantic(
        &self,
        output: &Value,
        upstream: &Upstream,
        model: &dyn ModelClient,
    ) -> Result<Vec<DimensionScore>, EvaluationError> {
        let dimensions = self.dimensions();
        let context = self.semantic_context(output, upstream);
        rubric::score(model, &dimensions, &context, output).await
    }

    /// Tier 3: check materialized artifacts against the output.
    async fn check_artifact(
        &self,
        _output: &Value,
        _artifacts: &[MaterializedArtifact],
        _upstream: &Upstream,
    ) -> Result<ArtifactReport, EvaluationError> {
        Ok(ArtifactReport::default())
    }
}
