//! Artifact and log sink for the execution pipeline.
//!
//! The pipeline only ever writes here: artifacts are stored by reference
//! and a log line is appended per dispatch. Two backends are provided, one
//! in memory and one writing JSON files under a directory.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod json_workspace;

pub use trait_::{ArtifactMetadata, LogEntry, Result, Workspace, WorkspaceError};
pub use memory::{InMemoryWorkspace, StoredArtifact};
pub use json_workspace::JsonWorkspace;
