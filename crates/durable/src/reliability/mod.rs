//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with fixed or exponential backoff

mod retry;

pub use retry::{Backoff, RetryPolicy};

pub(crate) use retry::duration_millis;
