//! Worker pool for task execution
//!
//! This module provides:
//! - [`WorkerPool`] - Claims activity tasks and runs them concurrently
//! - [`TaskPoller`] - Task polling with exponential backoff while idle
//!
//! # Flow
//!
//! ```text
//!  TaskPoller ──claim──▶ Semaphore-limited execution ──▶ WorkflowExecutor
//!      ▲                                                    │
//!      └────────────── retry requeued after delay ◀─────────┘
//! ```

mod poller;
mod pool;

pub use poller::{PollerConfig, TaskPoller};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};
