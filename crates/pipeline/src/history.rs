//! Terminal execution records, grouped by task.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use taskstack_core::{ExecutionRecord, ExecutionStatus, TaskId};
use tracing::debug;

use crate::executor::PriorAssets;
use crate::registry::DescriptorRegistry;

/// Append-only history of dispatches.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    records: RwLock<HashMap<TaskId, Vec<ExecutionRecord>>>,
}

impl ExecutionHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a terminal record. Non-terminal records are ignored.
    pub fn append(&self, record: ExecutionRecord) {
        if !record.is_terminal() {
            debug!(execution_id = %record.id, "Skipping non-terminal record");
            return;
        }
        self.records.write().entry(record.task_id).or_default().push(record);
    }

    /// Records for a task, oldest first.
    pub fn records(&self, task_id: TaskId) -> Vec<ExecutionRecord> {
        self.records.read().get(&task_id).cloned().unwrap_or_default()
    }

    /// Most recent record for a task.
    pub fn latest(&self, task_id: TaskId) -> Option<ExecutionRecord> {
        self.records
            .read()
            .get(&task_id)
            .and_then(|records| records.last().cloned())
    }

    /// Assets published by the task's completed dispatches.
    ///
    /// The latest completed record per executor wins. Assets are keyed by
    /// the descriptor's asset key, or the executor id when the executor is
    /// no longer registered. Read under a single lock, so a concurrent
    /// append is either fully visible or not at all.
    pub fn prior_assets(&self, task_id: TaskId, registry: &DescriptorRegistry) -> PriorAssets {
        let guard = self.records.read();
        let Some(records) = guard.get(&task_id) else {
            return PriorAssets::new();
        };

        let mut priors = PriorAssets::new();
        for record in records
            .iter()
            .filter(|r| r.status == ExecutionStatus::Completed)
        {
            let Some(output) = &record.output else {
                continue;
            };
            let asset_key = registry
                .get(&record.executor_id)
                .map(|d| d.asset_key.clone())
                .unwrap_or_else(|| record.executor_id.clone());
            priors.insert(
                record.executor_id.clone(),
                BTreeMap::from([(asset_key, output.clone())]),
            );
        }
        priors
    }
}
