//! Model-scored rubric used by the semantic tier.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::EvaluationError;
use crate::model::ModelClient;

/// A named rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Key the model must score under
    pub name: String,
    /// Question put to the model
    pub description: String,
}

impl Dimension {
    /// Create a dimension.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Score for one dimension, in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Dimension name
    pub name: String,
    /// Score
    pub score: f64,
    /// Reviewer notes
    #[serde(default)]
    pub notes: Vec<String>,
}

impl DimensionScore {
    /// Create a score without notes.
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score,
            notes: Vec::new(),
        }
    }
}

/// Ask the model to score `content` against `dimensions`.
///
/// Returns an empty list without calling the model when there are no
/// dimensions. Dimensions the model leaves out score 0.0.
pub async fn score(
    model: &dyn ModelClient,
    dimensions: &[Dimension],
    context: &str,
    content: &Value,
) -> Result<Vec<DimensionScore>, EvaluationError> {
    if dimensions.is_empty() {
        return Ok(Vec::new());
    }

    let system = system_prompt(dimensions);
    let content_json = serde_json::to_string_pretty(content)
        .map_err(|e| EvaluationError::Other(e.to_string()))?;
    let user = if context.is_empty() {
        format!("Content:\n{}\n\nEvaluate and return JSON only.", content_json)
    } else {
        format!(
            "{}\n\nContent:\n{}\n\nEvaluate and return JSON only.",
            context, content_json
        )
    };

    let verdict = model.complete_json(&system, &user).await?;
    let scores = parse_verdict(dimensions, &verdict)?;
    debug!(dimensions = scores.len(), "Scored rubric");
    Ok(scores)
}

fn system_prompt(dimensions: &[Dimension]) -> String {
    let lines = dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}. {} -- {}", i + 1, d.name, d.description))
        .collect::<Vec<_>>()
        .join("\n");
    let shape = dimensions
        .iter()
        .map(|d| format!("\"{}\": {{\"score\": float, \"notes\": [str]}}", d.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a quality evaluator.\n\
         Evaluate the content on these dimensions:\n{}\n\n\
         Score each dimension from 0.0 to 1.0 and give actionable notes for low scores.\n\n\
         Return JSON only:\n{{\"dimensions\": {{{}}}, \"summary\": str}}",
        lines, shape
    )
}

/// Read `{"dimensions": {name: {"score", "notes"}}}` for each declared dimension.
pub fn parse_verdict(
    dimensions: &[Dimension],
    verdict: &Value,
) -> Result<Vec<DimensionScore>, EvaluationError> {
    let scored = verdict
        .get("dimensions")
        .and_then(Value::as_object)
        .ok_or_else(|| EvaluationError::Malformed("missing \"dimensions\" object".to_string()))?;

    Ok(dimensions
        .iter()
        .map(|d| match scored.get(&d.name) {
            Some(entry) => DimensionScore {
                name: d.name.clone(),
                score: entry
                    .get("score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0),
                notes: entry
                    .get("notes")
                    .and_then(Value::as_array)
                    .map(|notes| {
                        notes
                            .iter()
                            .filter_map(|n| n.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            None => DimensionScore {
                name: d.name.clone(),
                score: 0.0,
                notes: vec!["not scored".to_string()],
            },
        })
        .collect())
}
