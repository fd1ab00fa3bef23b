//! Type-name dispatch for workflows and activities
//!
//! The log only records type names and JSON payloads. The executor turns a
//! workflow type back into a state machine through [`WorkflowRegistry`]; the
//! worker pool turns an activity type back into a handler through
//! [`ActivityRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::activity::{Activity, ActivityContext, ActivityError};
use crate::workflow::{Workflow, WorkflowAction};

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    #[error("failed to deserialize workflow input: {0}")]
    Deserialization(#[source] serde_json::Error),
}

// =============================================================================
// Workflows
// =============================================================================

/// The part of [`Workflow`] the executor needs, with JSON results
pub trait AnyWorkflow: Send + Sync {
    fn workflow_type(&self) -> &'static str;

    fn on_start(&mut self) -> Vec<WorkflowAction>;

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction>;

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError)
        -> Vec<WorkflowAction>;

    fn is_completed(&self) -> bool;
}

struct Typed<W>(W);

impl<W: Workflow> AnyWorkflow for Typed<W> {
    fn workflow_type(&self) -> &'static str {
        W::TYPE
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        self.0.on_start()
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        self.0.on_activity_completed(activity_id, result)
    }

    fn on_activity_failed(
        &mut self,
        activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction> {
        self.0.on_activity_failed(activity_id, error)
    }

    fn is_completed(&self) -> bool {
        self.0.is_completed()
    }
}

/// Builds a workflow instance from its recorded input
pub type WorkflowFactory = fn(Value) -> Result<Box<dyn AnyWorkflow>, serde_json::Error>;

fn build<W: Workflow>(input: Value) -> Result<Box<dyn AnyWorkflow>, serde_json::Error> {
    let input: W::Input = serde_json::from_value(input)?;
    Ok(Box::new(Typed(W::new(input))))
}

#[derive(Default)]
pub struct WorkflowRegistry {
    factories: HashMap<&'static str, WorkflowFactory>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: Workflow>(&mut self) {
        self.factories.insert(W::TYPE, build::<W>);
    }

    pub fn with<W: Workflow>(mut self) -> Self {
        self.register::<W>();
        self
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    /// Instantiate a workflow from its type name and recorded input
    pub fn create(
        &self,
        workflow_type: &str,
        input: Value,
    ) -> Result<Box<dyn AnyWorkflow>, RegistryError> {
        let factory = self
            .factories
            .get(workflow_type)
            .ok_or_else(|| RegistryError::UnknownWorkflowType(workflow_type.to_string()))?;
        factory(input).map_err(RegistryError::Deserialization)
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &types)
            .finish()
    }
}

// =============================================================================
// Activities
// =============================================================================

/// Type-erased activity: JSON in, JSON out
pub type ActivityHandler = Arc<
    dyn Fn(ActivityContext, Value) -> BoxFuture<'static, Result<Value, ActivityError>>
        + Send
        + Sync,
>;

#[derive(Default, Clone)]
pub struct ActivityRegistry {
    handlers: HashMap<String, ActivityHandler>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity under its `TYPE`
    ///
    /// Input that does not deserialize fails the attempt without retry.
    pub fn register<A: Activity>(&mut self, activity: A) {
        let activity = Arc::new(activity);
        let handler: ActivityHandler = Arc::new(move |ctx: ActivityContext, input: Value| {
            let activity = activity.clone();
            Box::pin(async move {
                let input: A::Input = serde_json::from_value(input)?;
                let output = activity.execute(&ctx, input).await?;
                Ok(serde_json::to_value(output)?)
            })
        });
        self.handlers.insert(A::TYPE.to_string(), handler);
    }

    pub fn with<A: Activity>(mut self, activity: A) -> Self {
        self.register(activity);
        self
    }

    pub fn get(&self, activity_type: &str) -> Option<ActivityHandler> {
        self.handlers.get(activity_type).cloned()
    }

    pub fn activity_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = self.activity_types();
        types.sort();
        f.debug_struct("ActivityRegistry")
            .field("activity_types", &types)
            .finish()
    }
}
