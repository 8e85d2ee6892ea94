//! Tier verdicts.

use serde::{Deserialize, Serialize};

use crate::evaluator::ArtifactReport;
use crate::rubric::DimensionScore;

/// The three quality tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateTier {
    /// Output shape and fields
    Structural,
    /// Rubric scored by a model
    Semantic,
    /// Materialized artifacts
    Artifact,
}

impl std::fmt::Display for GateTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateTier::Structural => write!(f, "structural"),
            GateTier::Semantic => write!(f, "semantic"),
            GateTier::Artifact => write!(f, "artifact"),
        }
    }
}

/// A tier ran and rejected the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{tier} gate failed: {summary}")]
pub struct GateFailure {
    /// Rejecting tier
    pub tier: GateTier,
    /// One-line summary
    pub summary: String,
    /// Individual findings
    pub findings: Vec<String>,
}

impl GateFailure {
    /// Create a failure.
    pub fn new(tier: GateTier, summary: impl Into<String>, findings: Vec<String>) -> Self {
        Self {
            tier,
            summary: summary.into(),
            findings,
        }
    }
}

/// Tier 1 verdict: any error fails.
pub fn structural_gate(errors: Vec<String>) -> Result<(), GateFailure> {
    if errors.is_empty() {
        return Ok(());
    }
    let preview = errors.iter().take(3).cloned().collect::<Vec<_>>().join("; ");
    Err(GateFailure::new(
        GateTier::Structural,
        format!(
            "structural validation failed with {} error(s): {}",
            errors.len(),
            preview
        ),
        errors,
    ))
}

/// Tier 2 verdict: every dimension must reach `threshold`.
///
/// An empty score list passes.
pub fn semantic_gate(scores: &[DimensionScore], threshold: f64) -> Result<(), GateFailure> {
    let low = below(scores, threshold);
    if low.is_empty() {
        return Ok(());
    }
    Err(GateFailure::new(
        GateTier::Semantic,
        format!("{} dimension(s) below {:.2}", low.len(), threshold),
        low,
    ))
}

/// Tier 3 verdict: no consistency errors and every score reaches `threshold`.
pub fn artifact_gate(report: &ArtifactReport, threshold: f64) -> Result<(), GateFailure> {
    let mut findings = report.errors.clone();
    findings.extend(below(&report.dimensions, threshold));
    if findings.is_empty() {
        return Ok(());
    }
    Err(GateFailure::new(
        GateTier::Artifact,
        format!("artifact check failed with {} finding(s)", findings.len()),
        findings,
    ))
}

fn below(scores: &[DimensionScore], threshold: f64) -> Vec<String> {
    scores
        .iter()
        .filter(|s| s.score < threshold)
        .map(|s| {
            if s.notes.is_empty() {
                format!("{}: {:.2}", s.name, s.score)
            } else {
                format!("{}: {:.2} ({})", s.name, s.score, s.notes.join("; "))
            }
        })
        .collect()
}
