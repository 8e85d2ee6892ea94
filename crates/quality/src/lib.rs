//! Quality gate for executor output.
//!
//! Every output passes three tiers before it is accepted:
//!
//! 1. structural checks on the output's shape, with no external calls,
//! 2. a model-scored rubric over named dimensions,
//! 3. checks on materialized artifacts, for executors that produce them.

#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod evaluator;
pub mod rubric;
pub mod gate;
pub mod checks;

pub use error::EvaluationError;
pub use model::{ModelClient, ModelError};
pub use evaluator::{ArtifactReport, Evaluator, MaterializedArtifact, Upstream};
pub use rubric::{Dimension, DimensionScore};
pub use gate::{artifact_gate, semantic_gate, structural_gate, GateFailure, GateTier};
pub use checks::{
    check_id_coverage, check_metric, check_order_continuous, check_uri, success_rate,
    UriStatus,
};
