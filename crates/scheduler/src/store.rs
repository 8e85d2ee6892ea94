//! Task and layer stores.
//!
//! Plain containers with no knowledge of the execution pointer. Freezing
//! rules are enforced one level up, in [`crate::stack`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use taskstack_core::{Hook, Layer, LayerEntry, Task, TaskId, TaskStatus};

use crate::error::{Result, SchedulerError};

/// Tasks keyed by id, remembering creation order.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, replacing any task with the same id.
    pub fn insert(&mut self, task: Task) {
        if !self.tasks.contains_key(&task.id) {
            self.order.push(task.id);
        }
        self.tasks.insert(task.id, task);
    }

    /// Get a task by id.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Get a task by id, failing with `NotFound`.
    pub fn require(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or_else(|| SchedulerError::task_not_found(id))
    }

    /// Mutable lookup, failing with `NotFound`.
    pub fn require_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::task_not_found(id))
    }

    /// Whether the store holds `id`.
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Remove a task.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.remove(&id)?;
        self.order.retain(|t| *t != id);
        Some(task)
    }

    /// All tasks in creation order.
    pub fn list(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Ordered layers with contiguous indices.
#[derive(Debug, Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
}

impl LayerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Get a layer by index.
    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Get a layer by index, failing with `NotFound`.
    pub fn require(&self, index: usize) -> Result<&Layer> {
        self.layers
            .get(index)
            .ok_or_else(|| SchedulerError::layer_not_found(index))
    }

    /// Mutable lookup, failing with `NotFound`.
    pub fn require_mut(&mut self, index: usize) -> Result<&mut Layer> {
        self.layers
            .get_mut(index)
            .ok_or_else(|| SchedulerError::layer_not_found(index))
    }

    /// Append a layer at the end and return its index.
    pub fn push(&mut self, pre_hook: Option<Hook>, post_hook: Option<Hook>) -> usize {
        let index = self.layers.len();
        self.layers
            .push(Layer::new(index).with_hooks(pre_hook, post_hook));
        index
    }

    /// Insert a layer at `index`, shifting later layers up by one.
    ///
    /// `index` may equal the current length (append).
    pub fn insert(&mut self, index: usize, layer: Layer) -> Result<()> {
        if index > self.layers.len() {
            return Err(SchedulerError::InvalidArgument(format!(
                "layer index {} is past the end of the stack ({} layers)",
                index,
                self.layers.len()
            )));
        }
        self.layers.insert(index, layer);
        self.reindex();
        Ok(())
    }

    /// Every `(layer index, position)` where `task_id` is referenced.
    pub fn references(&self, task_id: TaskId) -> Vec<(usize, usize)> {
        self.layers
            .iter()
            .filter_map(|l| l.position_of(task_id).map(|p| (l.index, p)))
            .collect()
    }

    /// Snapshot of all layers.
    pub fn list(&self) -> Vec<Layer> {
        self.layers.clone()
    }

    fn reindex(&mut self) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.index = i;
        }
    }
}

/// Partial task update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskUpdate {
    /// Replace the description
    pub description: Option<Value>,
    /// Move to this status
    pub status: Option<TaskStatus>,
    /// Merge these keys into the progress map
    pub progress: Option<Map<String, Value>>,
    /// Replace the results
    pub results: Option<Value>,
}

impl TaskUpdate {
    /// Update that only changes status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Set results.
    pub fn with_results(mut self, results: Value) -> Self {
        self.results = Some(results);
        self
    }

    /// Merge a progress key.
    pub fn with_progress(mut self, key: impl Into<String>, value: Value) -> Self {
        self.progress
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Change to a single hook slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookChange {
    /// Leave the hook as it is
    #[default]
    Keep,
    /// Install this hook
    Set(Hook),
    /// Remove the hook
    Clear,
}

impl HookChange {
    pub(crate) fn apply(self, slot: &mut Option<Hook>) {
        match self {
            HookChange::Keep => {}
            HookChange::Set(hook) => *slot = Some(hook),
            HookChange::Clear => *slot = None,
        }
    }
}

/// Change to a layer's hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookUpdate {
    /// Pre-hook change
    pub pre_hook: HookChange,
    /// Post-hook change
    pub post_hook: HookChange,
}

pub(crate) fn entry(task_id: TaskId) -> LayerEntry {
    LayerEntry::new(task_id)
}
