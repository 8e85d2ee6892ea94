//! Layer model - an ordered group of task references with optional hooks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::id::TaskId;
use crate::Time;

/// Opaque hook descriptor.
///
/// The scheduler only tracks when a hook is due; interpreting it is up to
/// the caller that drives the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hook(pub Value);

impl Hook {
    /// Wrap a descriptor.
    pub fn new(descriptor: Value) -> Self {
        Self(descriptor)
    }

    /// Borrow the descriptor.
    pub fn descriptor(&self) -> &Value {
        &self.0
    }
}

/// A task reference inside a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    /// Referenced task
    pub task_id: TaskId,

    /// When the reference was placed in the layer
    pub inserted_at: Time,
}

impl LayerEntry {
    /// Create an entry stamped with the current time.
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            inserted_at: chrono::Utc::now(),
        }
    }
}

/// An ordered group of tasks executed between an optional pre- and post-hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Position in the stack (0-based, contiguous)
    pub index: usize,

    /// Ordered task references
    pub entries: Vec<LayerEntry>,

    /// Hook due before the first task
    pub pre_hook: Option<Hook>,

    /// Hook due after the last task
    pub post_hook: Option<Hook>,

    /// When created
    pub created_at: Time,
}

impl Layer {
    /// Create an empty layer at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            entries: Vec::new(),
            pre_hook: None,
            post_hook: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set the hooks.
    pub fn with_hooks(mut self, pre_hook: Option<Hook>, post_hook: Option<Hook>) -> Self {
        self.pre_hook = pre_hook;
        self.post_hook = post_hook;
        self
    }

    /// Position of `task_id` within the layer.
    pub fn position_of(&self, task_id: TaskId) -> Option<usize> {
        self.entries.iter().position(|e| e.task_id == task_id)
    }

    /// Whether the layer references `task_id`.
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.position_of(task_id).is_some()
    }

    /// Referenced task ids in order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.entries.iter().map(|e| e.task_id).collect()
    }

    /// Whether the layer has nothing to schedule.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.pre_hook.is_none() && self.post_hook.is_none()
    }
}
