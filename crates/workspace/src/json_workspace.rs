//! JSON file workspace.
//!
//! Layout under the root directory:
//!
//! ```text
//! artifacts/<id>.<ext>        artifact content
//! artifacts/<id>.meta.json     handle + metadata
//! logs.jsonl                  one log entry per line
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskstack_core::{ArtifactHandle, ArtifactId};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::trait_::{ArtifactMetadata, LogEntry, Result, Workspace, WorkspaceError};

#[derive(Serialize, Deserialize)]
struct ArtifactRecord {
    handle: ArtifactHandle,
    metadata: ArtifactMetadata,
}

/// File-based workspace.
pub struct JsonWorkspace {
    root: PathBuf,
    log_lock: Mutex<()>,
}

impl JsonWorkspace {
    /// Open a workspace, creating the directory layout if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("artifacts")).await?;
        Ok(Self {
            root,
            log_lock: Mutex::new(()),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_path(&self) -> PathBuf {
        self.root.join("logs.jsonl")
    }

    fn content_path(&self, id: ArtifactId, media_type: &str) -> Result<PathBuf> {
        let extension = extension_for(media_type).ok_or_else(|| {
            WorkspaceError::Other(format!("unsupported media type: {:?}", media_type))
        })?;
        Ok(self
            .root
            .join("artifacts")
            .join(format!("{}.{}", id, extension)))
    }

    fn record_path(&self, id: ArtifactId) -> PathBuf {
        self.root.join("artifacts").join(format!("{}.meta.json", id))
    }

    /// Read back every log entry.
    pub async fn load_logs(&self) -> Result<Vec<LogEntry>> {
        let raw = match fs::read_to_string(self.log_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| Ok(serde_json::from_str::<LogEntry>(l)?))
            .collect()
    }

    /// Read back an artifact's handle and metadata.
    pub async fn load_artifact(&self, id: ArtifactId) -> Result<Option<(ArtifactHandle, ArtifactMetadata)>> {
        match fs::read_to_string(self.record_path(id)).await {
            Ok(json) => {
                let record: ArtifactRecord = serde_json::from_str(&json)?;
                Ok(Some((record.handle, record.metadata)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Workspace for JsonWorkspace {
    async fn store_artifact(&self, bytes: Vec<u8>, metadata: ArtifactMetadata) -> Result<ArtifactHandle> {
        let id = ArtifactId::new();
        let path = self.content_path(id, &metadata.media_type)?;
        fs::write(&path, &bytes).await?;

        let handle = ArtifactHandle {
            id,
            uri: path.to_string_lossy().into_owned(),
            name: metadata.name.clone(),
            media_type: metadata.media_type.clone(),
            size: bytes.len() as u64,
        };
        let record = ArtifactRecord {
            handle: handle.clone(),
            metadata,
        };
        fs::write(self.record_path(id), serde_json::to_string_pretty(&record)?.as_bytes()).await?;
        debug!(artifact_id = %id, path = %path.display(), "Stored artifact");
        Ok(handle)
    }

    async fn append_log(&self, entry: LogEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.log_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// File extension for a media type, or `None` if it cannot be used as one.
fn extension_for(media_type: &str) -> Option<&str> {
    let extension = match media_type {
        "" => "bin",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "application/json" | "text/json" => "json",
        "image/jpeg" => "jpg",
        "audio/mpeg" => "mp3",
        other => match other.split_once('/') {
            Some((_, subtype)) if !subtype.is_empty() => subtype,
            Some(_) => "bin",
            // Bare extension hint such as "png"
            None => other,
        },
    };
    let usable = !extension.starts_with('.')
        && !extension.contains("..")
        && extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
    usable.then_some(extension)
}
