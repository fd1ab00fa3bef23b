//! The `Activity` trait and its error type

use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ActivityContext;

/// A failed activity attempt
///
/// `retryable` is the activity's own verdict; the retry policy still decides
/// whether attempts remain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    pub message: String,
    /// Label for the failing capability, e.g. `ANALYSIS`
    #[serde(default)]
    pub error_type: Option<String>,
    pub retryable: bool,
}

impl ActivityError {
    fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable,
        }
    }

    /// Transient failure; another attempt may succeed
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(message, true)
    }

    /// Permanent failure; fails the activity at once
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::new(message, false)
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(format!("{:#}", err))
    }
}

/// Input or output that does not match the activity's types cannot be fixed by retrying
impl From<serde_json::Error> for ActivityError {
    fn from(err: serde_json::Error) -> Self {
        Self::non_retryable(err.to_string()).with_type("SERIALIZATION")
    }
}

/// One step of a workflow, run by a worker outside the state machine
///
/// Activities are where I/O happens. Inputs and outputs cross the task queue
/// as JSON and are recorded in the workflow log, so both must round-trip
/// through serde.
///
/// # Example
///
/// ```ignore
/// use docflow_durable::prelude::*;
///
/// struct ChecksumActivity;
///
/// #[async_trait]
/// impl Activity for ChecksumActivity {
///     const TYPE: &'static str = "checksum";
///     type Input = String;
///     type Output = u64;
///
///     async fn execute(
///         &self,
///         ctx: &ActivityContext,
///         input: Self::Input,
///     ) -> Result<Self::Output, ActivityError> {
///         Ok(input.bytes().map(u64::from).sum())
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Registry key, also the `activity_type` of scheduled tasks
    const TYPE: &'static str;

    type Input: Serialize + DeserializeOwned + Send;
    type Output: Serialize + DeserializeOwned + Send;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError>;
}
