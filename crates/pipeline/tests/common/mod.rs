//! Shared fixtures for pipeline integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use taskstack_pipeline::{
    DescriptorRegistry, Evaluator, ExecutionError, Executor, ExecutorDescriptor, ModelClient,
    ModelError, Pipeline, PipelineConfig, Registration,
};
use taskstack_quality::{Dimension, Upstream};
use taskstack_workspace::InMemoryWorkspace;

/// Returns its scripted outputs in order, repeating the last one.
pub struct Scripted {
    pub outputs: Arc<Mutex<VecDeque<Value>>>,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Executor for Scripted {
    async fn run(&self, _input: Value) -> Result<Value, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = self.outputs.lock();
        let output = if outputs.len() > 1 {
            outputs.pop_front()
        } else {
            outputs.front().cloned()
        };
        output.ok_or_else(|| ExecutionError::Failed("script is empty".to_string()))
    }
}

/// Sleeps longer than any test bound.
pub struct Sleeper;

#[async_trait]
impl Executor for Sleeper {
    async fn run(&self, _input: Value) -> Result<Value, ExecutionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(json!({"title": "late"}))
    }
}

/// Requires a non-empty `title` string.
pub struct TitleRequired;

impl Evaluator for TitleRequired {
    fn name(&self) -> &str {
        "title-required"
    }

    fn check_structure(&self, output: &Value, _upstream: &Upstream) -> Vec<String> {
        match output.get("title").and_then(Value::as_str) {
            Some(title) if !title.is_empty() => Vec::new(),
            _ => vec!["title is missing".to_string()],
        }
    }
}

/// Structural check plus one rubric dimension.
pub struct Clarity;

impl Evaluator for Clarity {
    fn name(&self) -> &str {
        "clarity"
    }

    fn check_structure(&self, output: &Value, upstream: &Upstream) -> Vec<String> {
        TitleRequired.check_structure(output, upstream)
    }

    fn dimensions(&self) -> Vec<Dimension> {
        vec![Dimension::new("clarity", "Is it clear?")]
    }
}

/// Model returning canned clarity scores in order, repeating the last.
pub struct ScoringModel {
    pub scores: Mutex<VecDeque<f64>>,
    pub calls: AtomicUsize,
}

impl ScoringModel {
    pub fn new(scores: &[f64]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ModelClient for ScoringModel {
    async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scores = self.scores.lock();
        let score = if scores.len() > 1 {
            scores.pop_front()
        } else {
            scores.front().copied()
        }
        .unwrap_or(1.0);
        Ok(json!({"dimensions": {"clarity": {"score": score, "notes": ["scripted"]}}}))
    }
}

/// A registration for a scripted executor checked by `TitleRequired`.
pub fn create_test_scripted(
    id: &'static str,
    outputs: Vec<Value>,
) -> (Registration, Arc<AtomicUsize>) {
    let outputs = Arc::new(Mutex::new(VecDeque::from(outputs)));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registration: Registration = Arc::new(move || {
        let outputs = Arc::clone(&outputs);
        let calls = Arc::clone(&counter);
        Ok(ExecutorDescriptor::new(
            id,
            move |_model| {
                Arc::new(Scripted {
                    outputs: Arc::clone(&outputs),
                    calls: Arc::clone(&calls),
                }) as Arc<dyn Executor>
            },
            || Arc::new(TitleRequired) as Arc<dyn Evaluator>,
        ))
    });
    (registration, calls)
}

pub fn create_test_pipeline(
    registrations: Vec<Registration>,
    model: Arc<dyn ModelClient>,
    config: PipelineConfig,
) -> (Pipeline, InMemoryWorkspace) {
    let workspace = InMemoryWorkspace::new();
    let pipeline = Pipeline::new(
        Arc::new(DescriptorRegistry::new(registrations)),
        model,
        Arc::new(workspace.clone()),
    )
    .with_config(config);
    (pipeline, workspace)
}
