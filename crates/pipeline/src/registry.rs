//! Executor registry with atomic reload.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::descriptor::ExecutorDescriptor;

/// A registration routine from the static descriptor table.
pub type Registration = Arc<dyn Fn() -> Result<ExecutorDescriptor, String> + Send + Sync>;

type DescriptorMap = HashMap<String, Arc<ExecutorDescriptor>>;

/// A registration that did not make it into the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationFailure {
    /// Index in the registration table
    pub position: usize,
    /// Executor id, when the routine got far enough to produce one
    pub executor_id: Option<String>,
    /// What went wrong
    pub reason: String,
}

/// Outcome of a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadReport {
    /// Ids now registered, sorted
    pub loaded: Vec<String>,
    /// Registrations that failed
    pub failed: Vec<RegistrationFailure>,
}

/// Summary of a registered executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    /// Executor id
    pub executor_id: String,
    /// Asset key
    pub asset_key: String,
    /// Upstream executor ids
    pub upstream_keys: Vec<String>,
    /// Whether the artifact tier applies
    pub materializes: bool,
    /// Description
    pub description: String,
}

/// Registry mapping executor ids to descriptors.
///
/// Readers take a cheap clone of the current table; [`reload`](Self::reload)
/// builds a new table off to the side and swaps it in whole.
pub struct DescriptorRegistry {
    table: Vec<Registration>,
    current: RwLock<Arc<DescriptorMap>>,
}

impl DescriptorRegistry {
    /// Create a registry and load it from `table`.
    pub fn new(table: Vec<Registration>) -> Self {
        let registry = Self {
            table,
            current: RwLock::new(Arc::new(HashMap::new())),
        };
        registry.reload();
        registry
    }

    /// Re-run every registration routine and swap in the result.
    pub fn reload(&self) -> ReloadReport {
        let mut map = DescriptorMap::new();
        let mut failed = Vec::new();

        for (position, register) in self.table.iter().enumerate() {
            match register() {
                Ok(descriptor) if map.contains_key(&descriptor.executor_id) => {
                    warn!(executor_id = %descriptor.executor_id, position, "Duplicate executor id");
                    failed.push(RegistrationFailure {
                        position,
                        executor_id: Some(descriptor.executor_id.clone()),
                        reason: format!("duplicate executor id: {}", descriptor.executor_id),
                    });
                }
                Ok(descriptor) => {
                    map.insert(descriptor.executor_id.clone(), Arc::new(descriptor));
                }
                Err(reason) => {
                    warn!(position, %reason, "Executor registration failed");
                    failed.push(RegistrationFailure {
                        position,
                        executor_id: None,
                        reason,
                    });
                }
            }
        }

        let mut loaded: Vec<String> = map.keys().cloned().collect();
        loaded.sort();

        *self.current.write() = Arc::new(map);
        info!(loaded = loaded.len(), failed = failed.len(), "Reloaded executor registry");

        ReloadReport { loaded, failed }
    }

    /// Look up a descriptor.
    pub fn get(&self, executor_id: &str) -> Option<Arc<ExecutorDescriptor>> {
        self.current.read().get(executor_id).cloned()
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.current.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Summaries of every registered executor, sorted by id.
    pub fn describe(&self) -> Vec<DescriptorInfo> {
        let snapshot = Arc::clone(&*self.current.read());
        let mut infos: Vec<DescriptorInfo> = snapshot
            .values()
            .map(|d| DescriptorInfo {
                executor_id: d.executor_id.clone(),
                asset_key: d.asset_key.clone(),
                upstream_keys: d.upstream_keys.clone(),
                materializes: d.has_materializer(),
                description: d.description.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.executor_id.cmp(&b.executor_id));
        infos
    }

    /// Number of registered executors.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("registrations", &self.table.len())
            .field("loaded", &self.list())
            .finish()
    }
}
