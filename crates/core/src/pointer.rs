//! Execution pointer - the scheduling frontier.

use serde::{Deserialize, Serialize};

/// A schedulable slot within one layer.
///
/// Variant order is execution order: the pre-hook, then tasks by position,
/// then the post-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// The layer's pre-hook
    PreHook,
    /// The task entry at this position
    Task(usize),
    /// The layer's post-hook
    PostHook,
}

/// A slot together with its layer, totally ordered in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Layer index
    pub layer: usize,
    /// Slot within the layer
    pub slot: Slot,
}

impl Position {
    /// Create a position.
    pub fn new(layer: usize, slot: Slot) -> Self {
        Self { layer, slot }
    }
}

/// The single cursor over the stack.
///
/// It names the most recently claimed unit: everything at or before it is
/// executed or executing. At most one hook flag is set. For a post-hook the
/// task index is one past the layer's last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionPointer {
    /// Current layer
    pub layer_index: usize,

    /// Current task position within the layer
    pub task_index: usize,

    /// The current unit is the layer's pre-hook
    pub executing_pre_hook: bool,

    /// The current unit is the layer's post-hook
    pub executing_post_hook: bool,
}

impl ExecutionPointer {
    /// Build a pointer resting on `position`. `entries` is the entry count of
    /// the position's layer.
    pub fn at(position: Position, entries: usize) -> Self {
        let (task_index, pre, post) = match position.slot {
            Slot::PreHook => (0, true, false),
            Slot::Task(i) => (i, false, false),
            Slot::PostHook => (entries, false, true),
        };
        Self {
            layer_index: position.layer,
            task_index,
            executing_pre_hook: pre,
            executing_post_hook: post,
        }
    }

    /// The position this pointer rests on.
    pub fn position(&self) -> Position {
        let slot = if self.executing_pre_hook {
            Slot::PreHook
        } else if self.executing_post_hook {
            Slot::PostHook
        } else {
            Slot::Task(self.task_index)
        };
        Position::new(self.layer_index, slot)
    }
}
