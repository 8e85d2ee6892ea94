//! Dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use taskstack_core::{
    ArtifactHandle, ExecutionRecord, ExecutionStatus, FailureDiagnostic, FailureStage, TaskId,
};
use taskstack_quality::{
    artifact_gate, semantic_gate, structural_gate, Evaluator, GateFailure, GateTier,
    MaterializedArtifact, ModelClient, Upstream,
};
use taskstack_workspace::{ArtifactMetadata, LogEntry, Workspace};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::descriptor::ExecutorDescriptor;
use crate::error::{ExecutionError, PipelineError, Result};
use crate::executor::{InputContext, PriorAssets};
use crate::history::ExecutionHistory;
use crate::registry::DescriptorRegistry;

/// Output that passed every tier, with its unsaved artifacts.
struct Accepted {
    output: Value,
    artifacts: Vec<MaterializedArtifact>,
}

/// Quality-gated executor pipeline.
///
/// `dispatch` holds no scheduler state; callers claim a unit from the
/// stack, dispatch it, then write the outcome back.
pub struct Pipeline {
    registry: Arc<DescriptorRegistry>,
    model: Arc<dyn ModelClient>,
    workspace: Arc<dyn Workspace>,
    history: Arc<ExecutionHistory>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with the default configuration and a fresh history.
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        model: Arc<dyn ModelClient>,
        workspace: Arc<dyn Workspace>,
    ) -> Self {
        Self {
            registry,
            model,
            workspace,
            history: Arc::new(ExecutionHistory::new()),
            config: PipelineConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = PipelineConfig {
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        self
    }

    /// Share an existing history.
    pub fn with_history(mut self, history: Arc<ExecutionHistory>) -> Self {
        self.history = history;
        self
    }

    /// Terminal records of every dispatch made through this pipeline.
    pub fn history(&self) -> &Arc<ExecutionHistory> {
        &self.history
    }

    /// The executor registry.
    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Priors for `task_id` assembled from this pipeline's history.
    pub fn prior_assets(&self, task_id: TaskId) -> PriorAssets {
        self.history.prior_assets(task_id, &self.registry)
    }

    /// Run `executor_id` for `task_id` until its output passes every tier or
    /// attempts run out.
    ///
    /// Always returns a terminal record unless the executor is unknown. The
    /// record is also appended to the history and logged to the workspace.
    pub async fn dispatch(
        &self,
        executor_id: &str,
        task_id: TaskId,
        prior_assets: &PriorAssets,
        extra_inputs: &Value,
    ) -> Result<ExecutionRecord> {
        let descriptor = self.registry.get(executor_id).ok_or_else(|| {
            warn!(executor_id, "Unknown executor");
            PipelineError::UnknownExecutor(executor_id.to_string())
        })?;

        let mut record = ExecutionRecord::new(executor_id, task_id);
        record.start();

        let upstream = descriptor.upstream(prior_assets);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_failure: Option<FailureDiagnostic> = None;
        let mut rework_notes: Option<String> = None;

        for attempt in 1..=max_attempts {
            info!(executor_id, task_id = %task_id, attempt, max_attempts, "Starting attempt");

            let ctx = InputContext {
                task_id,
                prior_assets,
                extra_inputs,
                rework_notes: if descriptor.feeds_back_failures {
                    rework_notes.as_deref()
                } else {
                    None
                },
                attempt,
            };

            let outcome = match descriptor.build_input(&ctx) {
                Ok(input) => {
                    record.begin_attempt(input.clone());
                    self.run_attempt(&descriptor, input, prior_assets, &upstream, attempt)
                        .await
                }
                Err(e) => {
                    record.begin_attempt(Value::Null);
                    Err(execution_failure(e, attempt))
                }
            };

            match outcome {
                Ok(accepted) => {
                    record = match self.persist(&descriptor, task_id, accepted, attempt).await {
                        Ok((output, handles)) => record.complete(output, handles),
                        Err(diagnostic) => {
                            error!(executor_id, %diagnostic, "Could not store artifacts");
                            record.fail(diagnostic)
                        }
                    };
                    return Ok(self.finish(record).await);
                }
                Err(diagnostic) => {
                    warn!(executor_id, attempt, %diagnostic, "Attempt failed");
                    rework_notes = Some(rework_summary(&diagnostic));
                    last_failure = Some(diagnostic);
                }
            }
        }

        let diagnostic = last_failure.unwrap_or_else(|| {
            FailureDiagnostic::new(FailureStage::Execution, max_attempts, "no attempt was made")
        });
        Ok(self.finish(record.fail(diagnostic)).await)
    }

    async fn run_attempt(
        &self,
        descriptor: &ExecutorDescriptor,
        input: Value,
        prior_assets: &PriorAssets,
        upstream: &Upstream,
        attempt: u32,
    ) -> std::result::Result<Accepted, FailureDiagnostic> {
        let bound = self.config.attempt_timeout;

        let output = self
            .execute(descriptor, input, bound)
            .await
            .map_err(|e| execution_failure(e, attempt))?;

        let evaluator = descriptor.evaluator();

        // Tier 1
        structural_gate(evaluator.check_structure(&output, upstream))
            .map_err(|f| gate_failure(f, attempt))?;

        // Tier 2
        let scores = bounded(
            bound,
            GateTier::Semantic,
            evaluator.as_ref(),
            attempt,
            evaluator.check_semantic(&output, upstream, self.model.as_ref()),
        )
        .await?;
        semantic_gate(&scores, self.config.semantic_threshold)
            .map_err(|f| gate_failure(f, attempt))?;

        // Tier 3, only for executors that materialize
        let artifacts = match descriptor.materializer() {
            Some(materializer) => {
                let artifacts = match timeout(bound, materializer.materialize(&output, prior_assets)).await {
                    Ok(Ok(artifacts)) => artifacts,
                    Ok(Err(e)) => return Err(execution_failure(e, attempt)),
                    Err(_) => return Err(execution_failure(ExecutionError::Timeout(bound), attempt)),
                };
                debug!(count = artifacts.len(), "Materialized artifacts");

                let report = bounded(
                    bound,
                    GateTier::Artifact,
                    evaluator.as_ref(),
                    attempt,
                    evaluator.check_artifact(&output, &artifacts, upstream),
                )
                .await?;
                artifact_gate(&report, self.config.artifact_threshold)
                    .map_err(|f| gate_failure(f, attempt))?;
                artifacts
            }
            None => Vec::new(),
        };

        Ok(Accepted { output, artifacts })
    }

    /// Run the executor on its own task so a timeout can walk away from it.
    async fn execute(
        &self,
        descriptor: &ExecutorDescriptor,
        input: Value,
        bound: Duration,
    ) -> std::result::Result<Value, ExecutionError> {
        let executor = descriptor.executor(Arc::clone(&self.model));
        let handle = tokio::spawn(async move { executor.run(input).await });

        match timeout(bound, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExecutionError::Failed(format!(
                "executor task aborted: {}",
                join_error
            ))),
            Err(_) => {
                error!(executor_id = %descriptor.executor_id, ?bound, "Executor timed out");
                Err(ExecutionError::Timeout(bound))
            }
        }
    }

    /// Store accepted artifacts and write their URIs into the output.
    async fn persist(
        &self,
        descriptor: &ExecutorDescriptor,
        task_id: TaskId,
        accepted: Accepted,
        attempt: u32,
    ) -> std::result::Result<(Value, Vec<ArtifactHandle>), FailureDiagnostic> {
        let Accepted {
            mut output,
            artifacts,
        } = accepted;
        let mut handles: Vec<ArtifactHandle> = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let metadata = ArtifactMetadata::new(&artifact.name, &artifact.media_type)
                .produced_by(&descriptor.executor_id, task_id);
            let handle = self
                .workspace
                .store_artifact(artifact.bytes, metadata)
                .await
                .map_err(|e| {
                    // The workspace is write-only, so earlier artifacts stay behind.
                    // Name them so the caller can clean up.
                    if !handles.is_empty() {
                        warn!(stored = handles.len(), artifact = %artifact.name, "Artifact store failed after partial persist");
                    }
                    FailureDiagnostic::new(
                        FailureStage::Workspace,
                        attempt,
                        format!("failed to store artifact {}: {}", artifact.name, e),
                    )
                    .with_details(
                        handles
                            .iter()
                            .map(|h| format!("stored before failure: {}", h.uri))
                            .collect(),
                    )
                })?;

            if let Some(slot) = &artifact.slot {
                if !write_slot(&mut output, slot, Value::String(handle.uri.clone())) {
                    warn!(slot = %slot, artifact = %artifact.name, "Artifact slot not found in output");
                }
            }
            handles.push(handle);
        }

        Ok((output, handles))
    }

    /// Log a terminal record and add it to the history.
    async fn finish(&self, record: ExecutionRecord) -> ExecutionRecord {
        let operation = match record.status {
            ExecutionStatus::Completed => "dispatch_completed",
            _ => "dispatch_failed",
        };
        let entry = LogEntry::new(operation, "execution", record.id.to_string())
            .for_dispatch(&record.executor_id, record.task_id)
            .with_details(json!({
                "attempts": record.attempts,
                "artifacts": record.artifacts.len(),
                "error": record.error,
            }));
        if let Err(e) = self.workspace.append_log(entry).await {
            warn!(execution_id = %record.id, error = %e, "Failed to append dispatch log");
        }

        info!(
            executor_id = %record.executor_id,
            task_id = %record.task_id,
            status = %record.status,
            attempts = record.attempts,
            "Dispatch finished"
        );
        self.history.append(record.clone());
        record
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Await an evaluator tier under the attempt bound.
async fn bounded<T, F>(
    bound: Duration,
    tier: GateTier,
    evaluator: &dyn Evaluator,
    attempt: u32,
    fut: F,
) -> std::result::Result<T, FailureDiagnostic>
where
    F: std::future::Future<Output = std::result::Result<T, taskstack_quality::EvaluationError>>,
{
    match timeout(bound, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(evaluator = evaluator.name(), %tier, error = %e, "Evaluator could not run");
            Err(FailureDiagnostic::new(
                FailureStage::Evaluation,
                attempt,
                format!("{} evaluation could not run: {}", tier, e),
            ))
        }
        Err(_) => {
            error!(evaluator = evaluator.name(), %tier, ?bound, "Evaluator timed out");
            Err(FailureDiagnostic::new(
                FailureStage::Timeout,
                attempt,
                format!("{} evaluation timed out after {:?}", tier, bound),
            ))
        }
    }
}

fn execution_failure(error: ExecutionError, attempt: u32) -> FailureDiagnostic {
    FailureDiagnostic::new(error.stage(), attempt, error.to_string())
}

fn gate_failure(failure: GateFailure, attempt: u32) -> FailureDiagnostic {
    let stage = match failure.tier {
        GateTier::Structural => FailureStage::Structural,
        GateTier::Semantic => FailureStage::Semantic,
        GateTier::Artifact => FailureStage::Artifact,
    };
    FailureDiagnostic::new(stage, attempt, failure.summary).with_details(failure.findings)
}

fn rework_summary(diagnostic: &FailureDiagnostic) -> String {
    let mut summary = diagnostic.to_string();
    for detail in &diagnostic.details {
        summary.push_str("\n- ");
        summary.push_str(detail);
    }
    summary
}

/// Write `value` at JSON pointer `slot`, creating the last object key if needed.
fn write_slot(output: &mut Value, slot: &str, value: Value) -> bool {
    if let Some(target) = output.pointer_mut(slot) {
        *target = value;
        return true;
    }
    let Some((parent, key)) = slot.rsplit_once('/') else {
        return false;
    };
    match output.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(key.replace("~1", "/").replace("~0", "~"), value);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::tests::{Echo, Lenient, NullModel};
    use crate::executor::Executor;
    use crate::registry::Registration;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use taskstack_quality::EvaluationError;
    use taskstack_workspace::InMemoryWorkspace;

    /// Records every input it sees and fails until told otherwise.
    struct Recorder {
        inputs: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Executor for Recorder {
        async fn run(&self, input: Value) -> std::result::Result<Value, ExecutionError> {
            let mut inputs = self.inputs.lock();
            inputs.push(input);
            if inputs.len() < 2 {
                Err(ExecutionError::Failed("first try".to_string()))
            } else {
                Ok(json!({"ok": true}))
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl Evaluator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn check_semantic(
            &self,
            _output: &Value,
            _upstream: &Upstream,
            _model: &dyn ModelClient,
        ) -> std::result::Result<Vec<taskstack_quality::DimensionScore>, EvaluationError> {
            Err(EvaluationError::Model("backend down".to_string()))
        }
    }

    fn create_test_pipeline(registrations: Vec<Registration>) -> (Pipeline, InMemoryWorkspace) {
        let workspace = InMemoryWorkspace::new();
        let pipeline = Pipeline::new(
            Arc::new(DescriptorRegistry::new(registrations)),
            Arc::new(NullModel),
            Arc::new(workspace.clone()),
        );
        (pipeline, workspace)
    }

    fn recorder_registration(inputs: Arc<Mutex<Vec<Value>>>, feedback: bool) -> Registration {
        Arc::new(move || {
            let inputs = Arc::clone(&inputs);
            let descriptor = ExecutorDescriptor::new(
                "recorder",
                move |_model| {
                    Arc::new(Recorder {
                        inputs: Arc::clone(&inputs),
                    }) as Arc<dyn Executor>
                },
                || Arc::new(Lenient) as Arc<dyn Evaluator>,
            )
            .with_input_builder(|ctx| {
                Ok(json!({
                    "attempt": ctx.attempt,
                    "notes": ctx.rework_notes,
                }))
            });
            Ok(if feedback {
                descriptor.with_failure_feedback()
            } else {
                descriptor
            })
        })
    }

    #[tokio::test]
    async fn test_rework_notes_only_with_opt_in() {
        let inputs = Arc::new(Mutex::new(Vec::new()));
        let (pipeline, _) = create_test_pipeline(vec![recorder_registration(Arc::clone(&inputs), false)]);
        let record = pipeline
            .dispatch("recorder", TaskId::new(), &PriorAssets::new(), &Value::Null)
            .await
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(inputs.lock()[1]["notes"], Value::Null);

        let inputs = Arc::new(Mutex::new(Vec::new()));
        let (pipeline, _) = create_test_pipeline(vec![recorder_registration(Arc::clone(&inputs), true)]);
        pipeline
            .dispatch("recorder", TaskId::new(), &PriorAssets::new(), &Value::Null)
            .await
            .unwrap();
        let notes = inputs.lock()[1]["notes"].as_str().unwrap_or_default().to_string();
        assert!(notes.contains("first try"));
        assert_eq!(inputs.lock()[1]["attempt"], json!(2));
    }

    #[tokio::test]
    async fn test_evaluation_error_counts_as_attempt() {
        let (pipeline, workspace) = create_test_pipeline(vec![Arc::new(|| {
            Ok(ExecutorDescriptor::new(
                "judged",
                |_model| Arc::new(Echo) as Arc<dyn Executor>,
                || Arc::new(Broken) as Arc<dyn Evaluator>,
            ))
        })]);
        let pipeline = pipeline.with_config(PipelineConfig::new().with_max_attempts(2));

        let record = pipeline
            .dispatch("judged", TaskId::new(), &PriorAssets::new(), &json!({}))
            .await
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.attempts, 2);
        let error = record.error.unwrap();
        assert_eq!(error.stage, FailureStage::Evaluation);
        assert!(error.message.contains("backend down"));

        let logs = workspace.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].operation, "dispatch_failed");
    }

    #[test]
    fn test_write_slot() {
        let mut output = json!({"cover": {"uri": null}, "pages": [{"uri": null}]});
        assert!(write_slot(&mut output, "/cover/uri", json!("mem://a")));
        assert!(write_slot(&mut output, "/pages/0/uri", json!("mem://b")));
        assert!(write_slot(&mut output, "/cover/alt~1text", json!("x")));
        assert!(!write_slot(&mut output, "/missing/uri", json!("y")));

        assert_eq!(output["cover"]["uri"], json!("mem://a"));
        assert_eq!(output["pages"][0]["uri"], json!("mem://b"));
        assert_eq!(output["cover"]["alt/text"], json!("x"));
    }

    #[test]
    fn test_gate_failure_maps_tier_to_stage() {
        let failure = GateFailure::new(GateTier::Artifact, "bad", vec!["missing file".to_string()]);
        let diagnostic = gate_failure(failure, 3);
        assert_eq!(diagnostic.stage, FailureStage::Artifact);
        assert_eq!(diagnostic.attempt, 3);
        assert!(rework_summary(&diagnostic).ends_with("- missing file"));
    }
}
