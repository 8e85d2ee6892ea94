//! Plan files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use taskstack_core::Hook;
use taskstack_scheduler::{BatchOperation, NewLayer, NewTask, TaskRef};

/// A plan: layers of tasks, run top to bottom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub layers: Vec<PlanLayer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLayer {
    pub pre_hook: Option<Hook>,
    pub post_hook: Option<Hook>,
    pub tasks: Vec<PlanTask>,
}

/// A task and the executors it runs through, in order.
///
/// Stored as the task's description, so the driver can read it back from
/// a claimed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executors: Vec<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl PlanTask {
    /// Executor ids to dispatch, `executor` first.
    pub fn chain(&self) -> Vec<&str> {
        self.executor
            .iter()
            .chain(self.executors.iter())
            .map(String::as_str)
            .collect()
    }

    /// Inputs for every dispatch. `text` defaults to the description.
    pub fn extra_inputs(&self) -> Value {
        let mut inputs = self.inputs.clone();
        inputs
            .entry("text")
            .or_insert_with(|| Value::String(self.description.clone()));
        Value::Object(inputs)
    }
}

impl Plan {
    /// Load and validate a plan file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read plan {}", path.display()))?;
        let plan: Plan = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid plan {}", path.display()))?;
        Ok(plan)
    }

    /// Fail on tasks naming executors outside `known`.
    pub fn validate(&self, known: &[String]) -> Result<()> {
        for (layer_index, layer) in self.layers.iter().enumerate() {
            for task in &layer.tasks {
                let chain = task.chain();
                if chain.is_empty() {
                    bail!(
                        "Task \"{}\" in layer {} names no executor",
                        task.description,
                        layer_index
                    );
                }
                if let Some(unknown) = chain.iter().find(|id| !known.iter().any(|k| k == *id)) {
                    bail!(
                        "Task \"{}\" in layer {} uses unknown executor {}",
                        task.description,
                        layer_index,
                        unknown
                    );
                }
            }
        }
        Ok(())
    }

    /// One batch that creates every task, then every layer.
    pub fn to_batch(&self) -> Result<Vec<BatchOperation>> {
        let mut tasks = Vec::new();
        let mut layers = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let mut refs = Vec::with_capacity(layer.tasks.len());
            for task in &layer.tasks {
                refs.push(TaskRef::Created {
                    operation: 0,
                    index: tasks.len(),
                });
                tasks.push(NewTask {
                    description: serde_json::to_value(task)?,
                });
            }
            layers.push(NewLayer {
                index: None,
                task_ids: refs,
                pre_hook: layer.pre_hook.clone(),
                post_hook: layer.post_hook.clone(),
            });
        }

        Ok(vec![
            BatchOperation::CreateTasks(tasks),
            BatchOperation::CreateLayers(layers),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskstack_scheduler::TaskStack;

    fn create_test_plan() -> Plan {
        serde_json::from_value(json!({
            "layers": [
                {
                    "pre_hook": {"notify": "start"},
                    "tasks": [
                        {"description": "Write it", "executors": ["outline", "digest"]},
                        {"description": "Say it", "executor": "echo", "inputs": {"text": "hi"}}
                    ]
                },
                {"tasks": [{"description": "Again", "executor": "echo"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_chain_and_inputs() {
        let plan = create_test_plan();
        let first = &plan.layers[0].tasks[0];
        assert_eq!(first.chain(), vec!["outline", "digest"]);
        assert_eq!(first.extra_inputs(), json!({"text": "Write it"}));
        assert_eq!(plan.layers[0].tasks[1].extra_inputs(), json!({"text": "hi"}));
    }

    #[test]
    fn test_validate() {
        let plan = create_test_plan();
        let known = vec!["digest".to_string(), "echo".to_string(), "outline".to_string()];
        assert!(plan.validate(&known).is_ok());

        let err = plan.validate(&known[1..]).unwrap_err();
        assert!(err.to_string().contains("unknown executor digest"));
    }

    #[test]
    fn test_batch_builds_stack() {
        let plan = create_test_plan();
        let stack = TaskStack::new();
        let report = stack.apply_batch(plan.to_batch().unwrap());
        assert!(report.success, "{:?}", report.errors);

        let layers = stack.list_layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].entries.len(), 2);
        assert!(layers[0].pre_hook.is_some());
        assert!(layers[1].pre_hook.is_none());

        let task = stack.get_task(layers[1].entries[0].task_id).unwrap();
        let stored: PlanTask = serde_json::from_value(task.description).unwrap();
        assert_eq!(stored.chain(), vec!["echo"]);
    }
}
