//! Persistence layer for durable execution
//!
//! This module provides:
//! - [`WorkflowEventStore`] trait for workflow and event persistence
//! - [`InMemoryWorkflowEventStore`] for tests and ephemeral runs
//! - [`FileWorkflowEventStore`] keeping each workflow's log on disk

mod file;
mod memory;
mod queue;
mod store;

pub use file::FileWorkflowEventStore;
pub use memory::InMemoryWorkflowEventStore;
pub use store::{
    ClaimedTask, StoreError, TaskDefinition, TaskFailureOutcome, WorkflowEventStore, WorkflowInfo,
    WorkflowStatus,
};
