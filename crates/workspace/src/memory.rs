//! In-memory workspace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use taskstack_core::{ArtifactHandle, ArtifactId};
use tokio::sync::Mutex;

use crate::trait_::{ArtifactMetadata, LogEntry, Result, Workspace, WorkspaceError};

/// An artifact kept by [`InMemoryWorkspace`].
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    /// Handle returned to the caller
    pub handle: ArtifactHandle,
    /// Metadata supplied on store
    pub metadata: ArtifactMetadata,
    /// Content
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    artifacts: HashMap<ArtifactId, StoredArtifact>,
    order: Vec<ArtifactId>,
    logs: Vec<LogEntry>,
}

/// Workspace that keeps everything in memory. Cloning shares the contents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkspace {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryWorkspace {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored artifacts in insertion order.
    pub async fn artifacts(&self) -> Vec<StoredArtifact> {
        let inner = self.inner.lock().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.artifacts.get(id))
            .cloned()
            .collect()
    }

    /// Content of one artifact.
    pub async fn artifact_bytes(&self, id: ArtifactId) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .await
            .artifacts
            .get(&id)
            .map(|a| a.bytes.clone())
            .ok_or_else(|| WorkspaceError::NotFound(format!("artifact {}", id)))
    }

    /// Appended log entries in order.
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.inner.lock().await.logs.clone()
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn store_artifact(&self, bytes: Vec<u8>, metadata: ArtifactMetadata) -> Result<ArtifactHandle> {
        let id = ArtifactId::new();
        let handle = ArtifactHandle {
            id,
            uri: format!("mem://artifacts/{}", id),
            name: metadata.name.clone(),
            media_type: metadata.media_type.clone(),
            size: bytes.len() as u64,
        };

        let mut inner = self.inner.lock().await;
        inner.order.push(id);
        inner.artifacts.insert(
            id,
            StoredArtifact {
                handle: handle.clone(),
                metadata,
                bytes,
            },
        );
        Ok(handle)
    }

    async fn append_log(&self, entry: LogEntry) -> Result<()> {
        self.inner.lock().await.logs.push(entry);
        Ok(())
    }
}
