//! # Durable Execution Engine
//!
//! A small event-sourced workflow engine for reliable, replay-safe
//! multi-step processing.
//!
//! ## Features
//!
//! - **Event-sourced workflows**: Every state change is an appended event, so a
//!   workflow can be rebuilt from its log after a restart
//! - **Automatic retries**: Per-activity retry policies with fixed or
//!   exponential backoff and optional jitter
//! - **Task queue**: Activities are claimed by a worker pool with bounded
//!   concurrency; retries become claimable once their backoff elapses
//! - **Pluggable storage**: In-memory store for tests, file-backed store for
//!   durable logs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowExecutor                        │
//! │  (drives workflow state machines, handles event replay)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   WorkflowEventStore                         │
//! │  (workflow records, append-only event logs, task queue)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool                              │
//! │  (claims tasks, executes activities, reports outcomes)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use docflow_durable::prelude::*;
//!
//! struct ConvertWorkflow {
//!     path: String,
//!     output: Option<String>,
//! }
//!
//! impl Workflow for ConvertWorkflow {
//!     const TYPE: &'static str = "convert";
//!     type Input = String;
//!     type Output = String;
//!
//!     fn new(input: Self::Input) -> Self {
//!         Self { path: input, output: None }
//!     }
//!
//!     fn on_start(&mut self) -> Vec<WorkflowAction> {
//!         vec![WorkflowAction::schedule_activity("convert-1", "convert", json!(self.path))]
//!     }
//!
//!     // ... implement other trait methods
//! }
//! ```

pub mod activity;
pub mod engine;
pub mod persistence;
pub mod reliability;
pub mod worker;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{Activity, ActivityContext, ActivityError};
    pub use crate::engine::{
        ActivityRegistry, ExecutorConfig, ExecutorError, ProcessResult, RecoveryReport,
        WorkflowExecutor, WorkflowRegistry,
    };
    pub use crate::persistence::{
        ClaimedTask, FileWorkflowEventStore, InMemoryWorkflowEventStore, StoreError,
        TaskDefinition, WorkflowEventStore, WorkflowInfo, WorkflowStatus,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::worker::{PollerConfig, WorkerPool, WorkerPoolConfig, WorkerPoolError};
    pub use crate::workflow::{
        ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent,
    };
    pub use async_trait::async_trait;
    pub use serde_json::json;
}

// Re-export key types at crate root
pub use activity::{Activity, ActivityContext, ActivityError};
pub use engine::{
    ActivityRegistry, ExecutorConfig, ExecutorError, ProcessResult, RecoveryReport,
    WorkflowExecutor, WorkflowRegistry,
};
pub use persistence::{
    FileWorkflowEventStore, InMemoryWorkflowEventStore, StoreError, WorkflowEventStore,
    WorkflowInfo, WorkflowStatus,
};
pub use reliability::{Backoff, RetryPolicy};
pub use worker::{PollerConfig, WorkerPool, WorkerPoolConfig, WorkerPoolError};
pub use workflow::{ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowEvent};
