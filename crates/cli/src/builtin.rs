//! Built-in executors and the offline model.
//!
//! Everything here is deterministic so plans can be run without a model
//! backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taskstack_pipeline::{
    Evaluator, ExecutionError, Executor, ExecutorDescriptor, Materializer, MaterializedArtifact,
    ModelClient, ModelError, PriorAssets, Registration, Typed, TypedExecutor,
};
use taskstack_quality::{
    check_id_coverage, check_metric, check_order_continuous, ArtifactReport, Dimension,
    DimensionScore, EvaluationError, Upstream,
};

/// Registration table for the built-in executors.
pub fn registrations() -> Vec<Registration> {
    vec![
        Arc::new(|| Ok(echo())),
        Arc::new(|| Ok(outline())),
        Arc::new(|| Ok(digest())),
    ]
}

/// Names of every rubric dimension the built-ins ask the model about.
pub fn rubric_dimensions() -> Vec<String> {
    OutlineEvaluator
        .dimensions()
        .into_iter()
        .map(|d| d.name)
        .collect()
}

/// Model stand-in that gives every known dimension full marks.
pub struct OfflineModel {
    dimensions: Vec<String>,
}

impl OfflineModel {
    pub fn new(dimensions: Vec<String>) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl ModelClient for OfflineModel {
    async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value, ModelError> {
        let scored: serde_json::Map<String, Value> = self
            .dimensions
            .iter()
            .map(|name| (name.clone(), json!({"score": 1.0, "notes": []})))
            .collect();
        Ok(json!({"dimensions": scored, "summary": "offline"}))
    }
}

#[derive(Debug, Deserialize)]
struct TextInput {
    text: String,
}

/// Returns the input text.
struct Echo;

#[derive(Debug, Serialize)]
struct EchoOutput {
    text: String,
}

#[async_trait]
impl TypedExecutor for Echo {
    type Input = TextInput;
    type Output = EchoOutput;

    async fn run(&self, input: TextInput) -> Result<EchoOutput, ExecutionError> {
        Ok(EchoOutput { text: input.text })
    }
}

struct EchoEvaluator;

impl Evaluator for EchoEvaluator {
    fn name(&self) -> &str {
        "echo"
    }

    fn check_structure(&self, output: &Value, _upstream: &Upstream) -> Vec<String> {
        match output["text"].as_str() {
            Some(text) if !text.trim().is_empty() => Vec::new(),
            _ => vec!["text is empty".to_string()],
        }
    }
}

fn echo() -> ExecutorDescriptor {
    ExecutorDescriptor::new(
        "echo",
        |_model| Arc::new(Typed(Echo)) as Arc<dyn Executor>,
        || Arc::new(EchoEvaluator) as Arc<dyn Evaluator>,
    )
    .with_description("Return the input text unchanged")
}

/// Splits text into numbered sections, one per paragraph.
struct Outline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Section {
    order: u64,
    heading: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct OutlineOutput {
    sections: Vec<Section>,
}

#[async_trait]
impl TypedExecutor for Outline {
    type Input = TextInput;
    type Output = OutlineOutput;

    async fn run(&self, input: TextInput) -> Result<OutlineOutput, ExecutionError> {
        let sections = split_sections(&input.text);
        if sections.is_empty() {
            return Err(ExecutionError::InvalidInput("no text to outline".to_string()));
        }
        Ok(OutlineOutput { sections })
    }
}

fn split_sections(text: &str) -> Vec<Section> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .zip(1u64..)
        .map(|(paragraph, order)| {
            let heading = paragraph
                .split(['.', '\n'])
                .next()
                .unwrap_or(paragraph)
                .split_whitespace()
                .take(6)
                .collect::<Vec<_>>()
                .join(" ");
            Section {
                order,
                heading,
                body: paragraph.to_string(),
            }
        })
        .collect()
}

struct OutlineEvaluator;

impl Evaluator for OutlineEvaluator {
    fn name(&self) -> &str {
        "outline"
    }

    fn check_structure(&self, output: &Value, _upstream: &Upstream) -> Vec<String> {
        let sections: Vec<Section> = match serde_json::from_value(output["sections"].clone()) {
            Ok(sections) => sections,
            Err(e) => return vec![format!("sections unreadable: {}", e)],
        };
        let mut errors = Vec::new();
        if sections.is_empty() {
            errors.push("no sections".to_string());
        }
        let orders: Vec<u64> = sections.iter().map(|s| s.order).collect();
        check_order_continuous(&mut errors, "section", &orders);
        errors.extend(
            sections
                .iter()
                .filter(|s| s.heading.is_empty())
                .map(|s| format!("section {} has no heading", s.order)),
        );
        errors
    }

    fn dimensions(&self) -> Vec<Dimension> {
        vec![
            Dimension::new("coverage", "Do the sections cover the whole text?"),
            Dimension::new("headings", "Does each heading name its section?"),
        ]
    }
}

fn outline() -> ExecutorDescriptor {
    ExecutorDescriptor::new(
        "outline",
        |_model| Arc::new(Typed(Outline)) as Arc<dyn Executor>,
        || Arc::new(OutlineEvaluator) as Arc<dyn Evaluator>,
    )
    .with_asset_key("sections")
    .with_description("Split text into numbered sections")
}

/// Summarises the upstream outline.
struct Digest;

#[derive(Debug, Deserialize)]
struct DigestInput {
    sections: Vec<Section>,
}

#[derive(Debug, Serialize)]
struct DigestOutput {
    summary: String,
    section_count: usize,
    headings: Vec<String>,
    document: Option<String>,
}

#[async_trait]
impl TypedExecutor for Digest {
    type Input = DigestInput;
    type Output = DigestOutput;

    async fn run(&self, input: DigestInput) -> Result<DigestOutput, ExecutionError> {
        let headings: Vec<String> = input.sections.iter().map(|s| s.heading.clone()).collect();
        Ok(DigestOutput {
            summary: headings.join("; "),
            section_count: headings.len(),
            headings,
            document: None,
        })
    }
}

fn upstream_headings(upstream: &Upstream) -> Option<Vec<String>> {
    let sections: Vec<Section> = serde_json::from_value(upstream.get("sections")?["sections"].clone()).ok()?;
    Some(sections.into_iter().map(|s| s.heading).collect())
}

struct DigestEvaluator;

#[async_trait]
impl Evaluator for DigestEvaluator {
    fn name(&self) -> &str {
        "digest"
    }

    fn check_structure(&self, output: &Value, upstream: &Upstream) -> Vec<String> {
        let mut errors = Vec::new();
        if output["summary"].as_str().map_or(true, str::is_empty) {
            errors.push("summary is empty".to_string());
        }
        let Some(expected) = upstream_headings(upstream) else {
            errors.push("no upstream outline".to_string());
            return errors;
        };
        let headings: Vec<String> = output["headings"]
            .as_array()
            .map(|hs| hs.iter().filter_map(|h| h.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        check_metric(
            &mut errors,
            "section_count",
            expected.len() as u64,
            output["section_count"].as_u64().unwrap_or(0),
        );
        check_id_coverage(
            &mut errors,
            "heading",
            &expected.into_iter().collect::<BTreeSet<_>>(),
            &headings.into_iter().collect::<BTreeSet<_>>(),
        );
        errors
    }

    async fn check_artifact(
        &self,
        _output: &Value,
        artifacts: &[MaterializedArtifact],
        _upstream: &Upstream,
    ) -> Result<ArtifactReport, EvaluationError> {
        let mut errors = Vec::new();
        check_metric(&mut errors, "documents", 1, artifacts.len());
        let written = artifacts.iter().filter(|a| !a.bytes.is_empty()).count();
        let rate = if artifacts.is_empty() {
            0.0
        } else {
            written as f64 / artifacts.len() as f64
        };
        Ok(ArtifactReport {
            errors,
            dimensions: vec![DimensionScore::new("written", rate)],
        })
    }
}

/// Renders the digest as a markdown document.
struct DigestDocument;

#[async_trait]
impl Materializer for DigestDocument {
    async fn materialize(
        &self,
        output: &Value,
        _prior_assets: &PriorAssets,
    ) -> Result<Vec<MaterializedArtifact>, ExecutionError> {
        let headings = output["headings"]
            .as_array()
            .ok_or_else(|| ExecutionError::Materialization("headings missing".to_string()))?;
        let mut document = String::from("# Digest\n\n");
        for (i, heading) in headings.iter().enumerate() {
            document.push_str(&format!("{}. {}\n", i + 1, heading.as_str().unwrap_or_default()));
        }
        Ok(vec![MaterializedArtifact::new("digest", document.into_bytes(), "text/markdown")
            .with_slot("/document")])
    }
}

fn digest() -> ExecutorDescriptor {
    ExecutorDescriptor::new(
        "digest",
        |_model| Arc::new(Typed(Digest)) as Arc<dyn Executor>,
        || Arc::new(DigestEvaluator) as Arc<dyn Evaluator>,
    )
    .with_upstream_keys(["outline"])
    .with_input_builder(|ctx| {
        let outline = ctx
            .prior_assets
            .get("outline")
            .and_then(|assets| assets.get("sections"))
            .ok_or_else(|| ExecutionError::InvalidInput("digest needs a completed outline".to_string()))?;
        Ok(outline.clone())
    })
    .with_materializer(|| Arc::new(DigestDocument) as Arc<dyn Materializer>)
    .with_description("Summarise the outline and render it as markdown")
}
