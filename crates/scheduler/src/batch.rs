//! Heterogeneous batch edits.
//!
//! A batch runs under the stack's lock, one operation after another. There
//! is no rollback: each operation's outcome is recorded on its own and
//! later operations still run when an earlier one fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskstack_core::{Hook, Layer, Task, TaskId};

use crate::error::{Result, SchedulerError};
use crate::stack::StackState;
use crate::store::HookUpdate;

/// Reference to a task from inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    /// An existing task
    Id(TaskId),
    /// The `index`-th task created by an earlier `CreateTasks` operation
    /// of the same batch
    Created {
        /// Operation index within the batch
        operation: usize,
        /// Task index within that operation
        index: usize,
    },
}

impl From<TaskId> for TaskRef {
    fn from(id: TaskId) -> Self {
        TaskRef::Id(id)
    }
}

/// Task to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Opaque description payload
    pub description: Value,
}

/// Layer to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewLayer {
    /// Insert at this index; append when absent
    pub index: Option<usize>,
    /// Initial task references
    pub task_ids: Vec<TaskRef>,
    /// Pre-hook
    pub pre_hook: Option<Hook>,
    /// Post-hook
    pub post_hook: Option<Hook>,
}

/// Task reference to add to a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTaskAdd {
    /// Target layer
    pub layer_index: usize,
    /// Task to add
    pub task: TaskRef,
    /// Position in the layer; append when absent
    #[serde(default)]
    pub position: Option<usize>,
}

/// Task reference to remove from a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTaskRemove {
    /// Target layer
    pub layer_index: usize,
    /// Task to remove
    pub task: TaskRef,
}

/// Task swap within a layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTaskReplace {
    /// Target layer
    pub layer_index: usize,
    /// Task to cancel
    pub old_task: TaskRef,
    /// Task taking its position
    pub new_task: TaskRef,
}

/// Hook change for one layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEdit {
    /// Target layer
    pub layer_index: usize,
    /// Changes to apply
    #[serde(flatten)]
    pub hooks: HookUpdate,
}

/// One batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum BatchOperation {
    /// Create tasks
    CreateTasks(Vec<NewTask>),
    /// Create layers
    CreateLayers(Vec<NewLayer>),
    /// Add task references to layers
    AddTasksToLayers(Vec<LayerTaskAdd>),
    /// Remove task references from layers
    RemoveTasksFromLayers(Vec<LayerTaskRemove>),
    /// Replace task references in layers
    ReplaceTasksInLayers(Vec<LayerTaskReplace>),
    /// Update layer hooks
    UpdateLayerHooks(Vec<HookEdit>),
}

impl BatchOperation {
    /// Kind tag used in the ledger.
    pub fn kind(&self) -> BatchKind {
        match self {
            BatchOperation::CreateTasks(_) => BatchKind::CreateTasks,
            BatchOperation::CreateLayers(_) => BatchKind::CreateLayers,
            BatchOperation::AddTasksToLayers(_) => BatchKind::AddTasksToLayers,
            BatchOperation::RemoveTasksFromLayers(_) => BatchKind::RemoveTasksFromLayers,
            BatchOperation::ReplaceTasksInLayers(_) => BatchKind::ReplaceTasksInLayers,
            BatchOperation::UpdateLayerHooks(_) => BatchKind::UpdateLayerHooks,
        }
    }
}

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// See [`BatchOperation::CreateTasks`]
    CreateTasks,
    /// See [`BatchOperation::CreateLayers`]
    CreateLayers,
    /// See [`BatchOperation::AddTasksToLayers`]
    AddTasksToLayers,
    /// See [`BatchOperation::RemoveTasksFromLayers`]
    RemoveTasksFromLayers,
    /// See [`BatchOperation::ReplaceTasksInLayers`]
    ReplaceTasksInLayers,
    /// See [`BatchOperation::UpdateLayerHooks`]
    UpdateLayerHooks,
}

/// Entities produced by a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationData {
    /// Created tasks
    Tasks(Vec<Task>),
    /// Created or mutated layers, one per item
    Layers(Vec<Layer>),
}

/// Ledger entry for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// Position in the batch
    pub operation_index: usize,
    /// Operation kind
    pub kind: BatchKind,
    /// Result of the operation
    pub result: Result<OperationData>,
}

impl OperationOutcome {
    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// No operation failed
    pub success: bool,
    /// One entry per operation, in order
    pub results: Vec<OperationOutcome>,
    /// Error messages of failed operations
    pub errors: Vec<String>,
    /// Every task created by the batch
    pub created_task_ids: Vec<TaskId>,
    /// Index of every layer created by the batch, at creation time
    pub created_layer_indices: Vec<usize>,
}

struct BatchContext {
    /// Tasks created per operation; `None` for failed or non-creating ones
    created: Vec<Option<Vec<TaskId>>>,
    created_task_ids: Vec<TaskId>,
    created_layer_indices: Vec<usize>,
}

impl BatchContext {
    fn resolve(&self, task: TaskRef) -> Result<TaskId> {
        match task {
            TaskRef::Id(id) => Ok(id),
            TaskRef::Created { operation, index } => self
                .created
                .get(operation)
                .and_then(|c| c.as_ref())
                .and_then(|ids| ids.get(index))
                .copied()
                .ok_or_else(|| {
                    SchedulerError::NotFound(format!(
                        "task #{} created by batch operation {}",
                        index, operation
                    ))
                }),
        }
    }
}

pub(crate) fn apply(state: &mut StackState, operations: Vec<BatchOperation>) -> BatchReport {
    let mut ctx = BatchContext {
        created: Vec::with_capacity(operations.len()),
        created_task_ids: Vec::new(),
        created_layer_indices: Vec::new(),
    };
    let mut results = Vec::with_capacity(operations.len());
    let mut errors = Vec::new();

    for (operation_index, operation) in operations.into_iter().enumerate() {
        let kind = operation.kind();
        let result = apply_one(state, &mut ctx, operation);

        let created = match &result {
            Ok(OperationData::Tasks(tasks)) => Some(tasks.iter().map(|t| t.id).collect()),
            _ => None,
        };
        ctx.created.push(created);

        if let Err(e) = &result {
            tracing::warn!(operation_index, ?kind, error = %e, "Batch operation failed");
            errors.push(format!("operation {}: {}", operation_index, e));
        }
        results.push(OperationOutcome {
            operation_index,
            kind,
            result,
        });
    }

    BatchReport {
        success: errors.is_empty(),
        results,
        errors,
        created_task_ids: ctx.created_task_ids,
        created_layer_indices: ctx.created_layer_indices,
    }
}

fn apply_one(
    state: &mut StackState,
    ctx: &mut BatchContext,
    operation: BatchOperation,
) -> Result<OperationData> {
    match operation {
        BatchOperation::CreateTasks(items) => {
            let mut tasks = Vec::with_capacity(items.len());
            for item in items {
                let task = state.create_task(item.description);
                ctx.created_task_ids.push(task.id);
                tasks.push(task);
            }
            Ok(OperationData::Tasks(tasks))
        }
        BatchOperation::CreateLayers(items) => {
            let mut layers = Vec::with_capacity(items.len());
            for item in items {
                let task_ids = item
                    .task_ids
                    .iter()
                    .map(|t| ctx.resolve(*t))
                    .collect::<Result<Vec<_>>>()?;
                let layer = match item.index {
                    Some(index) => state.insert_layer(index, &task_ids, item.pre_hook, item.post_hook)?,
                    None => {
                        let appended = state.layers.len();
                        state.insert_layer(appended, &task_ids, item.pre_hook, item.post_hook)?
                    }
                };
                ctx.created_layer_indices.push(layer.index);
                layers.push(layer);
            }
            Ok(OperationData::Layers(layers))
        }
        BatchOperation::AddTasksToLayers(items) => {
            let mut layers = Vec::with_capacity(items.len());
            for item in items {
                let task_id = ctx.resolve(item.task)?;
                layers.push(state.add_task_to_layer(item.layer_index, task_id, item.position)?);
            }
            Ok(OperationData::Layers(layers))
        }
        BatchOperation::RemoveTasksFromLayers(items) => {
            let mut layers = Vec::with_capacity(items.len());
            for item in items {
                let task_id = ctx.resolve(item.task)?;
                layers.push(state.remove_task_from_layer(item.layer_index, task_id)?);
            }
            Ok(OperationData::Layers(layers))
        }
        BatchOperation::ReplaceTasksInLayers(items) => {
            let mut layers = Vec::with_capacity(items.len());
            for item in items {
                let old = ctx.resolve(item.old_task)?;
                let new = ctx.resolve(item.new_task)?;
                layers.push(state.replace(item.layer_index, old, new)?);
            }
            Ok(OperationData::Layers(layers))
        }
        BatchOperation::UpdateLayerHooks(items) => {
            let mut layers = Vec::with_capacity(items.len());
            for item in items {
                layers.push(state.update_layer_hooks(item.layer_index, item.hooks)?);
            }
            Ok(OperationData::Layers(layers))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HookChange;
    use crate::TaskStack;
    use serde_json::json;
    use taskstack_core::TaskStatus;

    fn create_test_tasks(n: usize) -> BatchOperation {
        BatchOperation::CreateTasks(
            (0..n)
                .map(|i| NewTask {
                    description: json!({ "n": i }),
                })
                .collect(),
        )
    }

    #[test]
    fn test_create_then_reference_in_same_batch() {
        let stack = TaskStack::new();
        let report = stack.apply_batch(vec![
            create_test_tasks(2),
            BatchOperation::CreateLayers(vec![NewLayer {
                task_ids: vec![
                    TaskRef::Created { operation: 0, index: 1 },
                    TaskRef::Created { operation: 0, index: 0 },
                ],
                ..Default::default()
            }]),
        ]);

        assert!(report.success);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.created_task_ids.len(), 2);
        assert_eq!(report.created_layer_indices, vec![0]);
        let layer = stack.get_layer(0).unwrap();
        assert_eq!(
            layer.task_ids(),
            vec![report.created_task_ids[1], report.created_task_ids[0]]
        );
    }

    #[test]
    fn test_failure_does_not_stop_later_operations() {
        let stack = TaskStack::new();
        let report = stack.apply_batch(vec![
            create_test_tasks(1),
            BatchOperation::AddTasksToLayers(vec![LayerTaskAdd {
                layer_index: 7,
                task: TaskRef::Created { operation: 0, index: 0 },
                position: None,
            }]),
            BatchOperation::CreateLayers(vec![NewLayer {
                task_ids: vec![TaskRef::Created { operation: 0, index: 0 }],
                ..Default::default()
            }]),
        ]);

        assert!(!report.success);
        assert_eq!(report.results.len(), 3);
        assert!(report.results[0].is_success());
        assert!(matches!(
            report.results[1].result,
            Err(SchedulerError::NotFound(_))
        ));
        assert!(report.results[2].is_success());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(stack.list_layers().len(), 1);
    }

    #[test]
    fn test_reference_to_failed_operation_is_not_found() {
        let stack = TaskStack::new();
        let report = stack.apply_batch(vec![
            BatchOperation::ReplaceTasksInLayers(vec![LayerTaskReplace {
                layer_index: 0,
                old_task: TaskRef::Id(TaskId::new()),
                new_task: TaskRef::Id(TaskId::new()),
            }]),
            BatchOperation::CreateLayers(vec![NewLayer {
                task_ids: vec![TaskRef::Created { operation: 0, index: 0 }],
                ..Default::default()
            }]),
            BatchOperation::CreateLayers(vec![NewLayer {
                task_ids: vec![TaskRef::Created { operation: 5, index: 0 }],
                ..Default::default()
            }]),
        ]);

        assert!(!report.success);
        for outcome in &report.results {
            assert!(matches!(outcome.result, Err(SchedulerError::NotFound(_))));
        }
        assert!(stack.list_layers().is_empty());
    }

    #[test]
    fn test_partial_items_stay_applied() {
        let stack = TaskStack::new();
        let report = stack.apply_batch(vec![BatchOperation::CreateLayers(vec![
            NewLayer::default(),
            NewLayer {
                index: Some(9),
                ..Default::default()
            },
        ])]);

        assert!(!report.success);
        assert_eq!(report.created_layer_indices, vec![0]);
        assert_eq!(stack.list_layers().len(), 1);
    }

    #[test]
    fn test_batch_respects_frozen_layers() {
        let stack = TaskStack::new();
        let a = stack.create_task(json!("a"));
        let b = stack.create_task(json!("b"));
        stack.insert_layer(0, &[a.id], None, None).unwrap();
        stack.advance().unwrap();

        let report = stack.apply_batch(vec![
            BatchOperation::ReplaceTasksInLayers(vec![LayerTaskReplace {
                layer_index: 0,
                old_task: a.id.into(),
                new_task: b.id.into(),
            }]),
            BatchOperation::UpdateLayerHooks(vec![HookEdit {
                layer_index: 0,
                hooks: HookUpdate {
                    pre_hook: HookChange::Set(Hook::new(json!("late"))),
                    ..Default::default()
                },
            }]),
            BatchOperation::CreateLayers(vec![NewLayer {
                task_ids: vec![b.id.into()],
                ..Default::default()
            }]),
        ]);

        assert!(matches!(report.results[0].result, Err(SchedulerError::Frozen(_))));
        assert!(matches!(report.results[1].result, Err(SchedulerError::Frozen(_))));
        assert!(report.results[2].is_success());
        assert_eq!(stack.get_task(a.id).unwrap().status, TaskStatus::Pending);
        assert_eq!(stack.next().unwrap().task().unwrap().id, b.id);
    }

    #[test]
    fn test_batch_deserializes_from_json() {
        let id = TaskId::new();
        let raw = json!([
            {"type": "create_tasks", "params": [{"description": {"title": "intro"}}]},
            {"type": "create_layers", "params": [
                {"task_ids": [{"operation": 0, "index": 0}, id.to_string()], "pre_hook": {"kind": "warmup"}}
            ]},
            {"type": "update_layer_hooks", "params": [
                {"layer_index": 0, "post_hook": {"set": "done"}, "pre_hook": "clear"}
            ]}
        ]);
        let operations: Vec<BatchOperation> = serde_json::from_value(raw).unwrap();

        assert_eq!(operations.len(), 3);
        match &operations[1] {
            BatchOperation::CreateLayers(layers) => {
                assert_eq!(layers[0].task_ids[1], TaskRef::Id(id));
                assert!(layers[0].pre_hook.is_some());
            }
            other => panic!("unexpected operation {:?}", other.kind()),
        }
        match &operations[2] {
            BatchOperation::UpdateLayerHooks(edits) => {
                assert_eq!(edits[0].hooks.pre_hook, HookChange::Clear);
                assert_eq!(
                    edits[0].hooks.post_hook,
                    HookChange::Set(Hook::new(json!("done")))
                );
            }
            other => panic!("unexpected operation {:?}", other.kind()),
        }
    }
}
