//! Quality-gated execution pipeline.
//!
//! A dispatch resolves an executor descriptor, builds the executor's input
//! from prior assets, runs it and pushes the output through the three
//! quality tiers, retrying up to a bound. The result is always a terminal
//! [`ExecutionRecord`](taskstack_core::ExecutionRecord); only an unknown
//! executor id is reported as an error.

#![warn(missing_docs)]

pub mod error;
pub mod config;
pub mod executor;
pub mod descriptor;
pub mod registry;
pub mod history;
pub mod pipeline;

pub use error::{ExecutionError, PipelineError, Result};
pub use config::PipelineConfig;
pub use executor::{Executor, InputContext, Materializer, PriorAssets, Typed, TypedExecutor};
pub use descriptor::ExecutorDescriptor;
pub use registry::{DescriptorInfo, DescriptorRegistry, Registration, RegistrationFailure, ReloadReport};
pub use history::ExecutionHistory;
pub use pipeline::Pipeline;

// Contracts from the quality crate that executors and evaluators implement
pub use taskstack_quality::{Evaluator, MaterializedArtifact, ModelClient, ModelError};
