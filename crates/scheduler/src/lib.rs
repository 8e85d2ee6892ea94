//! Layered task stack scheduler.
//!
//! Tasks are grouped into ordered layers, each with an optional pre- and
//! post-hook. A single execution pointer walks the stack in
//! `pre-hook -> tasks -> post-hook -> next layer` order. Everything at or
//! behind the pointer is frozen; future work can be edited freely, either
//! one operation at a time or as an eagerly applied batch.

#![warn(missing_docs)]

pub mod error;
pub mod store;
pub mod frontier;
pub mod stack;
pub mod batch;
pub mod inbox;

pub use error::{Result, SchedulerError};
pub use store::{HookChange, HookUpdate, LayerStore, TaskStore, TaskUpdate};
pub use inbox::{Inbox, ReadUpdate};
pub use stack::{ScheduleUnit, StackSnapshot, TaskStack};
pub use batch::{
    BatchKind, BatchOperation, BatchReport, HookEdit, LayerTaskAdd, LayerTaskRemove,
    LayerTaskReplace, NewLayer, NewTask, OperationData, OperationOutcome, TaskRef,
};
