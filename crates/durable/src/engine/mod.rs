//! Workflow execution engine
//!
//! The engine module provides the `WorkflowExecutor` which drives workflow
//! state machines through event replay and action processing, and the
//! registries that map type names from the log back to code.

mod executor;
mod registry;

pub use executor::{ExecutorConfig, ExecutorError, ProcessResult, RecoveryReport, WorkflowExecutor};
pub use registry::{
    ActivityHandler, ActivityRegistry, AnyWorkflow, RegistryError, WorkflowFactory,
    WorkflowRegistry,
};
