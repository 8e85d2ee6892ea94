//! The task stack - stores, pointer and the operations over them.

use parking_lot::Mutex;
use serde_json::Value;
use taskstack_core::{
    ExecutionPointer, Hook, Layer, MessageId, Position, Slot, Task, TaskId, TaskStatus, UserMessage,
};
use tracing::{debug, info, warn};

use crate::batch::{self, BatchOperation, BatchReport};
use crate::error::{Result, SchedulerError};
use crate::frontier::{is_frozen, is_layer_frozen, next_position};
use crate::inbox::{Inbox, ReadUpdate};
use crate::store::{entry, HookUpdate, LayerStore, TaskStore, TaskUpdate};

/// A unit handed out by the scheduler.
///
/// Owns a snapshot of the owning layer so the caller can act on it
/// without holding any lock.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleUnit {
    /// The layer's pre-hook is due
    PreHook {
        /// Owning layer
        layer: Layer,
        /// Hook descriptor
        hook: Hook,
    },
    /// A task is due
    Task {
        /// Owning layer
        layer: Layer,
        /// Entry position within the layer
        position: usize,
        /// The task record
        task: Task,
    },
    /// The layer's post-hook is due
    PostHook {
        /// Owning layer
        layer: Layer,
        /// Hook descriptor
        hook: Hook,
    },
}

impl ScheduleUnit {
    /// Owning layer.
    pub fn layer(&self) -> &Layer {
        match self {
            ScheduleUnit::PreHook { layer, .. }
            | ScheduleUnit::Task { layer, .. }
            | ScheduleUnit::PostHook { layer, .. } => layer,
        }
    }

    /// The task, for task units.
    pub fn task(&self) -> Option<&Task> {
        match self {
            ScheduleUnit::Task { task, .. } => Some(task),
            _ => None,
        }
    }

    /// Position of the unit in the stack.
    pub fn position(&self) -> Position {
        let layer = self.layer().index;
        match self {
            ScheduleUnit::PreHook { .. } => Position::new(layer, Slot::PreHook),
            ScheduleUnit::Task { position, .. } => Position::new(layer, Slot::Task(*position)),
            ScheduleUnit::PostHook { .. } => Position::new(layer, Slot::PostHook),
        }
    }
}

/// Consistent view of all three stores.
#[derive(Debug, Clone)]
pub struct StackSnapshot {
    /// Tasks in creation order
    pub tasks: Vec<Task>,
    /// Layers in index order
    pub layers: Vec<Layer>,
    /// Pointer, absent until the first advance
    pub pointer: Option<ExecutionPointer>,
}

/// State guarded by the stack's lock.
#[derive(Debug, Default)]
pub(crate) struct StackState {
    pub(crate) tasks: TaskStore,
    pub(crate) layers: LayerStore,
    pub(crate) pointer: Option<ExecutionPointer>,
    pub(crate) messages: Inbox,
}

impl StackState {
    fn next_position(&self) -> Option<Position> {
        next_position(&self.layers, self.pointer.map(|p| p.position()))
    }

    fn unit_at(&self, position: Position) -> Option<ScheduleUnit> {
        let layer = self.layers.get(position.layer)?.clone();
        match position.slot {
            Slot::PreHook => {
                let hook = layer.pre_hook.clone()?;
                Some(ScheduleUnit::PreHook { layer, hook })
            }
            Slot::Task(i) => {
                let task_id = layer.entries.get(i)?.task_id;
                let task = self.tasks.get(task_id)?.clone();
                Some(ScheduleUnit::Task { layer, position: i, task })
            }
            Slot::PostHook => {
                let hook = layer.post_hook.clone()?;
                Some(ScheduleUnit::PostHook { layer, hook })
            }
        }
    }

    pub(crate) fn advance(&mut self) -> Result<ExecutionPointer> {
        let next = self.next_position().ok_or(SchedulerError::Exhausted)?;
        let entries = self.layers.require(next.layer)?.entries.len();
        let pointer = ExecutionPointer::at(next, entries);
        self.pointer = Some(pointer);
        Ok(pointer)
    }

    fn ensure_entry_mutable(&self, layer_index: usize, position: usize) -> Result<()> {
        if is_frozen(self.pointer.as_ref(), Position::new(layer_index, Slot::Task(position))) {
            return Err(SchedulerError::Frozen(format!(
                "position {} of layer {} is at or behind the execution pointer",
                position, layer_index
            )));
        }
        Ok(())
    }

    fn ensure_layer_mutable(&self, index: usize) -> Result<()> {
        if is_layer_frozen(self.pointer.as_ref(), index) {
            return Err(SchedulerError::Frozen(format!(
                "layer {} has already been entered by the execution pointer",
                index
            )));
        }
        Ok(())
    }

    /// Only pending tasks may be placed into a slot.
    fn ensure_schedulable(&self, task_id: TaskId) -> Result<()> {
        let task = self.tasks.require(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(SchedulerError::InvalidArgument(format!(
                "task {} is {} and cannot be scheduled",
                task_id, task.status
            )));
        }
        Ok(())
    }

    pub(crate) fn create_task(&mut self, description: Value) -> Task {
        let task = Task::new(description);
        debug!(task_id = %task.id, "Created task");
        self.tasks.insert(task.clone());
        task
    }

    pub(crate) fn update_task(&mut self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        if update.status == Some(TaskStatus::Cancelled) {
            return Err(SchedulerError::InvalidArgument(
                "tasks are cancelled by replacing them in their layer".to_string(),
            ));
        }

        let task = self.tasks.require_mut(id)?;
        if let Some(status) = update.status {
            task.transition(status)
                .map_err(|e| SchedulerError::InvalidArgument(e.to_string()))?;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(progress) = update.progress {
            task.progress.extend(progress);
        }
        if let Some(results) = update.results {
            task.results = Some(results);
        }
        task.touch();
        debug!(task_id = %id, status = %task.status, "Updated task");
        Ok(task.clone())
    }

    pub(crate) fn delete_task(&mut self, id: TaskId) -> Result<Task> {
        self.tasks.require(id)?;
        if let Some(&(layer, position)) = self.layers.references(id).first() {
            self.ensure_entry_mutable(layer, position)?;
            return Err(SchedulerError::InvalidArgument(format!(
                "task {} is still scheduled in layer {}; replace it instead",
                id, layer
            )));
        }
        let task = self
            .tasks
            .remove(id)
            .ok_or_else(|| SchedulerError::task_not_found(id))?;
        debug!(task_id = %id, "Deleted task");
        Ok(task)
    }

    pub(crate) fn create_layer(
        &mut self,
        pre_hook: Option<Hook>,
        post_hook: Option<Hook>,
    ) -> Result<Layer> {
        let index = self.layers.push(pre_hook, post_hook);
        debug!(layer = index, "Appended layer");
        Ok(self.layers.require(index)?.clone())
    }

    pub(crate) fn insert_layer(
        &mut self,
        index: usize,
        task_ids: &[TaskId],
        pre_hook: Option<Hook>,
        post_hook: Option<Hook>,
    ) -> Result<Layer> {
        self.ensure_layer_mutable(index)?;
        if index > self.layers.len() {
            return Err(SchedulerError::InvalidArgument(format!(
                "layer index {} is past the end of the stack ({} layers)",
                index,
                self.layers.len()
            )));
        }

        let mut layer = Layer::new(index).with_hooks(pre_hook, post_hook);
        for &task_id in task_ids {
            self.ensure_schedulable(task_id)?;
            if layer.contains(task_id) {
                return Err(SchedulerError::InvalidArgument(format!(
                    "task {} listed twice for the new layer",
                    task_id
                )));
            }
            layer.entries.push(entry(task_id));
        }

        self.layers.insert(index, layer)?;
        debug!(layer = index, tasks = task_ids.len(), "Inserted layer");
        Ok(self.layers.require(index)?.clone())
    }

    pub(crate) fn add_task_to_layer(
        &mut self,
        layer_index: usize,
        task_id: TaskId,
        position: Option<usize>,
    ) -> Result<Layer> {
        self.ensure_schedulable(task_id)?;
        let len = self.layers.require(layer_index)?.entries.len();
        let position = position.unwrap_or(len);
        if position > len {
            return Err(SchedulerError::InvalidArgument(format!(
                "position {} is past the end of layer {} ({} entries)",
                position, layer_index, len
            )));
        }
        self.ensure_entry_mutable(layer_index, position)?;

        let layer = self.layers.require_mut(layer_index)?;
        if layer.contains(task_id) {
            return Err(SchedulerError::InvalidArgument(format!(
                "task {} is already in layer {}",
                task_id, layer_index
            )));
        }
        layer.entries.insert(position, entry(task_id));
        debug!(layer = layer_index, position, task_id = %task_id, "Added task to layer");
        Ok(layer.clone())
    }

    pub(crate) fn remove_task_from_layer(
        &mut self,
        layer_index: usize,
        task_id: TaskId,
    ) -> Result<Layer> {
        let position = self
            .layers
            .require(layer_index)?
            .position_of(task_id)
            .ok_or_else(|| {
                SchedulerError::NotFound(format!("task {} in layer {}", task_id, layer_index))
            })?;
        self.ensure_entry_mutable(layer_index, position)?;

        let layer = self.layers.require_mut(layer_index)?;
        layer.entries.remove(position);
        debug!(layer = layer_index, task_id = %task_id, "Removed task from layer");
        Ok(layer.clone())
    }

    pub(crate) fn replace(
        &mut self,
        layer_index: usize,
        old_task_id: TaskId,
        new_task_id: TaskId,
    ) -> Result<Layer> {
        let layer = self.layers.require(layer_index)?;
        self.tasks.require(old_task_id)?;
        self.tasks.require(new_task_id)?;
        let position = layer.position_of(old_task_id).ok_or_else(|| {
            SchedulerError::NotFound(format!("task {} in layer {}", old_task_id, layer_index))
        })?;
        self.ensure_entry_mutable(layer_index, position)?;
        self.ensure_schedulable(new_task_id)?;
        if old_task_id == new_task_id || layer.contains(new_task_id) {
            return Err(SchedulerError::InvalidArgument(format!(
                "task {} is already in layer {}",
                new_task_id, layer_index
            )));
        }

        let old = self.tasks.require_mut(old_task_id)?;
        old.transition(TaskStatus::Cancelled).map_err(|e| {
            SchedulerError::Frozen(format!(
                "task {} is {} and can no longer be replaced",
                old_task_id, e.from
            ))
        })?;

        let layer = self.layers.require_mut(layer_index)?;
        layer.entries[position] = entry(new_task_id);
        debug!(
            layer = layer_index,
            position,
            old = %old_task_id,
            new = %new_task_id,
            "Replaced task"
        );
        Ok(layer.clone())
    }

    pub(crate) fn update_layer_hooks(
        &mut self,
        layer_index: usize,
        update: HookUpdate,
    ) -> Result<Layer> {
        self.layers.require(layer_index)?;
        self.ensure_layer_mutable(layer_index)?;

        let layer = self.layers.require_mut(layer_index)?;
        update.pre_hook.apply(&mut layer.pre_hook);
        update.post_hook.apply(&mut layer.post_hook);
        debug!(layer = layer_index, "Updated layer hooks");
        Ok(layer.clone())
    }
}

/// The layered task stack.
///
/// All operations take one short lock over the task store, layer store and
/// pointer together. Nothing blocks or performs I/O while holding it.
#[derive(Debug, Default)]
pub struct TaskStack {
    state: Mutex<StackState>,
}

impl TaskStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    // === Scheduling ===

    /// The next due unit, without moving the pointer.
    pub fn next(&self) -> Option<ScheduleUnit> {
        let state = self.state.lock();
        state.next_position().and_then(|p| state.unit_at(p))
    }

    /// Move the pointer onto the next unit.
    pub fn advance(&self) -> Result<ExecutionPointer> {
        let mut state = self.state.lock();
        let pointer = logged("advance", state.advance())?;
        info!(
            layer = pointer.layer_index,
            task = pointer.task_index,
            pre_hook = pointer.executing_pre_hook,
            post_hook = pointer.executing_post_hook,
            "Advanced execution pointer"
        );
        Ok(pointer)
    }

    /// Advance and return the unit the pointer now rests on, atomically.
    pub fn claim(&self) -> Result<ScheduleUnit> {
        let mut state = self.state.lock();
        let pointer = logged("claim", state.advance())?;
        let unit = state
            .unit_at(pointer.position())
            .ok_or(SchedulerError::Exhausted)?;
        info!(
            layer = pointer.layer_index,
            task = pointer.task_index,
            "Claimed schedule unit"
        );
        Ok(unit)
    }

    /// Current pointer, absent until the first advance.
    pub fn pointer(&self) -> Option<ExecutionPointer> {
        self.state.lock().pointer
    }

    // === Tasks ===

    /// Create a pending task.
    pub fn create_task(&self, description: Value) -> Task {
        self.state.lock().create_task(description)
    }

    /// Get a task.
    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    /// All tasks in creation order.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.list()
    }

    /// Apply a partial update to a task.
    pub fn update_task(&self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        logged("update_task", self.state.lock().update_task(id, update))
    }

    /// Delete a task that no layer references.
    pub fn delete_task(&self, id: TaskId) -> Result<Task> {
        logged("delete_task", self.state.lock().delete_task(id))
    }

    // === Layers ===

    /// Get a layer.
    pub fn get_layer(&self, index: usize) -> Option<Layer> {
        self.state.lock().layers.get(index).cloned()
    }

    /// All layers in index order.
    pub fn list_layers(&self) -> Vec<Layer> {
        self.state.lock().layers.list()
    }

    /// Append an empty layer.
    pub fn create_layer(&self, pre_hook: Option<Hook>, post_hook: Option<Hook>) -> Result<Layer> {
        self.state.lock().create_layer(pre_hook, post_hook)
    }

    /// Insert a layer at `index`, shifting later layers up by one.
    pub fn insert_layer(
        &self,
        index: usize,
        task_ids: &[TaskId],
        pre_hook: Option<Hook>,
        post_hook: Option<Hook>,
    ) -> Result<Layer> {
        logged(
            "insert_layer",
            self.state
                .lock()
                .insert_layer(index, task_ids, pre_hook, post_hook),
        )
    }

    /// Add a task reference to a layer, appending when `position` is `None`.
    pub fn add_task_to_layer(
        &self,
        layer_index: usize,
        task_id: TaskId,
        position: Option<usize>,
    ) -> Result<Layer> {
        logged(
            "add_task_to_layer",
            self.state
                .lock()
                .add_task_to_layer(layer_index, task_id, position),
        )
    }

    /// Remove a task reference from a layer.
    pub fn remove_task_from_layer(&self, layer_index: usize, task_id: TaskId) -> Result<Layer> {
        logged(
            "remove_task_from_layer",
            self.state
                .lock()
                .remove_task_from_layer(layer_index, task_id),
        )
    }

    /// Swap a future task for another in place, cancelling the old one.
    pub fn replace(
        &self,
        layer_index: usize,
        old_task_id: TaskId,
        new_task_id: TaskId,
    ) -> Result<Layer> {
        logged(
            "replace",
            self.state
                .lock()
                .replace(layer_index, old_task_id, new_task_id),
        )
    }

    /// Change the hooks of a layer the pointer has not entered.
    pub fn update_layer_hooks(&self, layer_index: usize, update: HookUpdate) -> Result<Layer> {
        logged(
            "update_layer_hooks",
            self.state.lock().update_layer_hooks(layer_index, update),
        )
    }

    // === Messages ===

    /// Record a user message, optionally linked to an existing task.
    pub fn create_message(
        &self,
        content: impl Into<String>,
        user_id: impl Into<String>,
        task_id: Option<TaskId>,
    ) -> Result<UserMessage> {
        let mut state = self.state.lock();
        let mut message = UserMessage::new(content, user_id);
        if let Some(task_id) = task_id {
            logged("create_message", state.tasks.require(task_id).map(|_| ()))?;
            message = message.for_task(task_id);
        }
        debug!(message_id = %message.id, user_id = %message.user_id, "Received message");
        state.messages.insert(message.clone());
        Ok(message)
    }

    /// Get a message.
    pub fn get_message(&self, id: MessageId) -> Option<UserMessage> {
        self.state.lock().messages.get(id).cloned()
    }

    /// Messages in arrival order, optionally only those from `user_id`.
    pub fn list_messages(&self, user_id: Option<&str>) -> Vec<UserMessage> {
        self.state.lock().messages.list(user_id)
    }

    /// Update the planner and/or user read status of a message.
    pub fn update_read_status(&self, id: MessageId, update: ReadUpdate) -> Result<UserMessage> {
        logged("update_read_status", self.state.lock().messages.mark(id, update))
    }

    /// Whether the message is linked to a task that is still pending.
    pub fn is_new_task(&self, id: MessageId) -> bool {
        let state = self.state.lock();
        state
            .messages
            .get(id)
            .and_then(|m| m.task_id)
            .and_then(|task_id| state.tasks.get(task_id))
            .map_or(false, |task| task.status == TaskStatus::Pending)
    }

    // === Batches ===

    /// Apply operations eagerly and in order under one lock.
    ///
    /// Never fails as a whole; per-operation errors are in the report.
    pub fn apply_batch(&self, operations: Vec<BatchOperation>) -> BatchReport {
        let mut state = self.state.lock();
        let report = batch::apply(&mut state, operations);
        if report.success {
            info!(operations = report.results.len(), "Applied batch");
        } else {
            warn!(
                operations = report.results.len(),
                failed = report.errors.len(),
                "Applied batch with failures"
            );
        }
        report
    }

    /// Consistent read of tasks, layers and pointer.
    pub fn snapshot(&self) -> StackSnapshot {
        let state = self.state.lock();
        StackSnapshot {
            tasks: state.tasks.list(),
            layers: state.layers.list(),
            pointer: state.pointer,
        }
    }
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!(operation, error = %e, "Scheduler operation rejected");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_stack(layer_sizes: &[usize]) -> (TaskStack, Vec<Vec<TaskId>>) {
        let stack = TaskStack::new();
        let mut ids = Vec::new();
        for (i, size) in layer_sizes.iter().enumerate() {
            stack.create_layer(None, None).unwrap();
            let mut layer_ids = Vec::new();
            for n in 0..*size {
                let task = stack.create_task(json!({"layer": i, "n": n}));
                stack.add_task_to_layer(i, task.id, None).unwrap();
                layer_ids.push(task.id);
            }
            ids.push(layer_ids);
        }
        (stack, ids)
    }

    #[test]
    fn test_next_is_pure() {
        let (stack, ids) = create_test_stack(&[2]);
        let first = stack.next().unwrap();
        assert_eq!(first.task().unwrap().id, ids[0][0]);
        assert_eq!(stack.next().unwrap(), first);
        assert!(stack.pointer().is_none());
    }

    #[test]
    fn test_single_task_then_exhausted_then_new_layer() {
        let stack = TaskStack::new();
        let a = stack.create_task(json!("A"));
        stack.insert_layer(0, &[a.id], None, None).unwrap();

        assert_eq!(stack.next().unwrap().task().unwrap().id, a.id);
        stack.advance().unwrap();
        assert!(stack.next().is_none());
        assert_eq!(stack.advance().unwrap_err(), SchedulerError::Exhausted);

        let b = stack.create_task(json!("B"));
        stack.insert_layer(1, &[b.id], None, None).unwrap();
        assert_eq!(stack.next().unwrap().task().unwrap().id, b.id);
    }

    #[test]
    fn test_hooks_bracket_tasks() {
        let stack = TaskStack::new();
        let a = stack.create_task(json!("A"));
        stack
            .insert_layer(
                0,
                &[a.id],
                Some(Hook::new(json!("pre"))),
                Some(Hook::new(json!("post"))),
            )
            .unwrap();

        assert!(matches!(stack.claim().unwrap(), ScheduleUnit::PreHook { .. }));
        let pointer = stack.pointer().unwrap();
        assert!(pointer.executing_pre_hook && !pointer.executing_post_hook);

        assert_eq!(stack.claim().unwrap().task().unwrap().id, a.id);
        let pointer = stack.pointer().unwrap();
        assert!(!pointer.executing_pre_hook && !pointer.executing_post_hook);

        assert!(matches!(stack.claim().unwrap(), ScheduleUnit::PostHook { .. }));
        assert!(stack.pointer().unwrap().executing_post_hook);
        assert!(stack.next().is_none());
    }

    #[test]
    fn test_pointer_is_monotonic() {
        let (stack, _) = create_test_stack(&[2, 0, 3, 1]);
        stack
            .update_layer_hooks(
                1,
                HookUpdate {
                    post_hook: crate::HookChange::Set(Hook::new(json!("flush"))),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut previous: Option<(usize, usize)> = None;
        while stack.next().is_some() {
            let p = stack.advance().unwrap();
            let key = (p.layer_index, p.task_index);
            if let Some(prev) = previous {
                assert!(key >= prev, "{:?} < {:?}", key, prev);
            }
            previous = Some(key);
        }
        assert!(stack.next().is_none());
        assert!(stack.advance().is_err());
    }

    #[test]
    fn test_replace_future_task() {
        let (stack, ids) = create_test_stack(&[1, 2]);
        stack.advance().unwrap();
        let x = stack.create_task(json!("X"));

        let layer = stack.replace(1, ids[1][1], x.id).unwrap();
        assert_eq!(layer.task_ids(), vec![ids[1][0], x.id]);
        assert_eq!(stack.get_task(ids[1][1]).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(stack.get_task(x.id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_replace_frozen_task_rejected() {
        let (stack, ids) = create_test_stack(&[2, 1]);
        stack.advance().unwrap();
        let x = stack.create_task(json!("X"));

        let err = stack.replace(0, ids[0][0], x.id).unwrap_err();
        assert!(matches!(err, SchedulerError::Frozen(_)));
        // Ahead of the pointer in the same layer is still mutable
        stack.replace(0, ids[0][1], x.id).unwrap();
        assert_eq!(stack.get_task(ids[0][0]).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_replace_missing_ids() {
        let (stack, ids) = create_test_stack(&[1]);
        let x = stack.create_task(json!("X"));

        let err = stack.replace(4, ids[0][0], x.id).unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
        let err = stack.replace(0, TaskId::new(), x.id).unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
        let err = stack.replace(0, ids[0][0], TaskId::new()).unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
        let err = stack.replace(0, x.id, ids[0][0]).unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[test]
    fn test_replace_with_duplicate_rejected() {
        let (stack, ids) = create_test_stack(&[2]);
        let err = stack.replace(0, ids[0][0], ids[0][1]).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
        assert_eq!(stack.get_layer(0).unwrap().task_ids(), ids[0]);
    }

    #[test]
    fn test_insert_layer_ahead_of_pointer() {
        let (stack, ids) = create_test_stack(&[1, 1]);
        stack.advance().unwrap();
        let x = stack.create_task(json!("X"));

        let layer = stack.insert_layer(1, &[x.id], None, None).unwrap();
        assert_eq!(layer.index, 1);
        assert_eq!(layer.task_ids(), vec![x.id]);

        let layers = stack.list_layers();
        assert_eq!(layers.len(), 3);
        assert_eq!(
            layers.iter().map(|l| l.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(layers[2].task_ids(), ids[1]);
    }

    #[test]
    fn test_insert_layer_at_or_before_pointer_rejected() {
        let (stack, _) = create_test_stack(&[1, 1, 1]);
        stack.advance().unwrap();
        stack.advance().unwrap();
        assert_eq!(stack.pointer().unwrap().layer_index, 1);

        for index in [0, 1] {
            let err = stack.insert_layer(index, &[], None, None).unwrap_err();
            assert!(matches!(err, SchedulerError::Frozen(_)));
        }
        stack.insert_layer(2, &[], None, None).unwrap();
        assert_eq!(stack.list_layers().len(), 4);
    }

    #[test]
    fn test_hook_update_on_entered_layer_rejected() {
        let (stack, _) = create_test_stack(&[2, 1]);
        stack.advance().unwrap();

        let err = stack
            .update_layer_hooks(0, HookUpdate::default())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Frozen(_)));
        stack.update_layer_hooks(1, HookUpdate::default()).unwrap();
    }

    #[test]
    fn test_add_and_remove_respect_pointer() {
        let (stack, ids) = create_test_stack(&[2]);
        stack.advance().unwrap();
        let x = stack.create_task(json!("X"));

        let err = stack.add_task_to_layer(0, x.id, Some(0)).unwrap_err();
        assert!(matches!(err, SchedulerError::Frozen(_)));
        let layer = stack.add_task_to_layer(0, x.id, Some(1)).unwrap();
        assert_eq!(layer.task_ids(), vec![ids[0][0], x.id, ids[0][1]]);

        let err = stack.remove_task_from_layer(0, ids[0][0]).unwrap_err();
        assert!(matches!(err, SchedulerError::Frozen(_)));
        let layer = stack.remove_task_from_layer(0, ids[0][1]).unwrap();
        assert_eq!(layer.task_ids(), vec![ids[0][0], x.id]);

        let err = stack.add_task_to_layer(0, x.id, None).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    }

    #[test]
    fn test_update_task_status_rules() {
        let stack = TaskStack::new();
        let task = stack.create_task(json!("t"));

        let err = stack
            .update_task(task.id, TaskUpdate::status(TaskStatus::Cancelled))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
        let err = stack
            .update_task(task.id, TaskUpdate::status(TaskStatus::Completed))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));

        stack
            .update_task(task.id, TaskUpdate::status(TaskStatus::InProgress))
            .unwrap();
        let updated = stack
            .update_task(
                task.id,
                TaskUpdate::status(TaskStatus::Completed)
                    .with_results(json!({"ok": true}))
                    .with_progress("percent", json!(100)),
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert_eq!(updated.results, Some(json!({"ok": true})));
        assert_eq!(updated.progress.get("percent"), Some(&json!(100)));
        assert!(updated.updated_at >= task.updated_at);
    }

    #[test]
    fn test_delete_task_rules() {
        let (stack, ids) = create_test_stack(&[1, 1]);
        let loose = stack.create_task(json!("loose"));
        stack.advance().unwrap();

        let err = stack.delete_task(ids[0][0]).unwrap_err();
        assert!(matches!(err, SchedulerError::Frozen(_)));
        let err = stack.delete_task(ids[1][0]).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));

        stack.delete_task(loose.id).unwrap();
        assert!(stack.get_task(loose.id).is_none());
    }

    #[test]
    fn test_delete_task_referenced_in_two_layers() {
        let (stack, ids) = create_test_stack(&[1, 1]);
        let shared = stack.create_task(json!("shared"));
        stack.add_task_to_layer(1, shared.id, None).unwrap();
        stack.add_task_to_layer(0, shared.id, None).unwrap();
        // Layer 0 now holds [ids[0][0], shared]; claim both
        stack.advance().unwrap();
        stack.advance().unwrap();

        let err = stack.delete_task(shared.id).unwrap_err();
        assert!(matches!(err, SchedulerError::Frozen(_)));
        assert!(stack.get_task(ids[1][0]).is_some());
    }

    #[test]
    fn test_cancelled_task_cannot_return() {
        let (stack, ids) = create_test_stack(&[1, 0]);
        let a = ids[0][0];
        let b = stack.create_task(json!("B"));

        stack.replace(0, a, b.id).unwrap();
        let err = stack.replace(0, b.id, a).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
        assert_eq!(stack.get_layer(0).unwrap().task_ids(), vec![b.id]);
        assert_eq!(stack.get_task(b.id).unwrap().status, TaskStatus::Pending);

        let err = stack.add_task_to_layer(1, a, None).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
        let err = stack.insert_layer(1, &[a], None, None).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
        assert_eq!(stack.list_layers().len(), 2);

        // The pending replacement is what gets handed out
        let unit = stack.claim().unwrap();
        assert_eq!(unit.task().map(|t| t.id), Some(b.id));
        stack
            .update_task(b.id, TaskUpdate::status(TaskStatus::InProgress))
            .unwrap();
    }

    #[test]
    fn test_finished_task_cannot_be_rescheduled() {
        let (stack, _) = create_test_stack(&[0]);
        let done = stack.create_task(json!("done"));
        stack
            .update_task(done.id, TaskUpdate::status(TaskStatus::InProgress))
            .unwrap();
        let err = stack.add_task_to_layer(0, done.id, None).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    }

    #[test]
    fn test_message_tracks_pending_task() {
        let (stack, ids) = create_test_stack(&[1]);
        let task_id = ids[0][0];
        let message = stack
            .create_message("cut a trailer", "alice", Some(task_id))
            .unwrap();
        let chat = stack.create_message("thanks", "alice", None).unwrap();

        assert!(stack.is_new_task(message.id));
        assert!(!stack.is_new_task(chat.id));
        assert!(!stack.is_new_task(MessageId::new()));

        stack.claim().unwrap();
        stack
            .update_task(task_id, TaskUpdate::status(TaskStatus::InProgress))
            .unwrap();
        assert!(!stack.is_new_task(message.id));
    }

    #[test]
    fn test_message_for_unknown_task_rejected() {
        let stack = TaskStack::new();
        let err = stack
            .create_message("hello", "alice", Some(TaskId::new()))
            .unwrap_err();

        assert!(matches!(err, SchedulerError::NotFound(_)));
        assert!(stack.list_messages(None).is_empty());
    }

    #[test]
    fn test_message_read_status() {
        let stack = TaskStack::new();
        let message = stack.create_message("hello", "alice", None).unwrap();
        stack.create_message("hi", "bob", None).unwrap();

        let read = stack
            .update_read_status(message.id, ReadUpdate::planner_read())
            .unwrap();
        assert_eq!(read.planner_status, taskstack_core::ReadStatus::Read);
        assert_eq!(stack.get_message(message.id), Some(read));
        assert_eq!(stack.list_messages(Some("bob")).len(), 1);
    }

    #[test]
    fn test_claim_on_exhausted_stack() {
        let stack = TaskStack::new();
        assert_eq!(stack.claim().unwrap_err(), SchedulerError::Exhausted);
    }

    #[test]
    fn test_replace_races_with_advance() {
        use std::sync::Arc;
        use std::thread;

        for _ in 0..50 {
            let (stack, ids) = create_test_stack(&[3]);
            let stack = Arc::new(stack);
            let target = ids[0][1];
            let x = stack.create_task(json!("X"));

            let advancer = {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    stack.advance().unwrap();
                    stack.advance().unwrap();
                })
            };
            let replacer = {
                let stack = Arc::clone(&stack);
                thread::spawn(move || stack.replace(0, target, x.id))
            };
            advancer.join().unwrap();
            let outcome = replacer.join().unwrap();

            let layer = stack.get_layer(0).unwrap();
            assert_eq!(layer.entries.len(), 3);
            match outcome {
                Ok(_) => {
                    assert_eq!(layer.task_ids(), vec![ids[0][0], x.id, ids[0][2]]);
                    assert_eq!(stack.get_task(target).unwrap().status, TaskStatus::Cancelled);
                }
                Err(e) => {
                    assert!(matches!(e, SchedulerError::Frozen(_)));
                    assert_eq!(layer.task_ids(), ids[0]);
                }
            }
        }
    }
}
