//! Per-attempt information handed to an activity

use std::fmt;

use uuid::Uuid;

/// Which workflow, step and attempt an execution belongs to
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub workflow_id: Uuid,
    pub activity_id: String,
    /// 1-based
    pub attempt: u32,
    pub max_attempts: u32,
    /// Empty outside a worker pool
    pub worker_id: String,
}

impl ActivityContext {
    pub fn new(workflow_id: Uuid, activity_id: String, attempt: u32, max_attempts: u32) -> Self {
        Self {
            workflow_id,
            activity_id,
            attempt,
            max_attempts,
            worker_id: String::new(),
        }
    }

    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Attempts left after this one
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }

    pub fn is_last_attempt(&self) -> bool {
        self.remaining_attempts() == 0
    }
}

impl fmt::Display for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} (attempt {}/{})",
            self.workflow_id, self.activity_id, self.attempt, self.max_attempts
        )
    }
}
