//! Activity abstractions
//!
//! Activities are units of work that are executed by workers. They:
//! - Receive JSON input recorded in the workflow's event log
//! - May fail and be retried according to the retry policy
//! - Report their outcome back to the executor, which appends it to the log

mod context;
mod definition;

pub use context::ActivityContext;
pub use definition::{Activity, ActivityError};
