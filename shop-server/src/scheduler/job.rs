//! Durable deferred actions

use serde::{Deserialize, Serialize};

/// What a job does when it fires
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduledAction {
    /// Cancel an order that is still unpaid
    AutoCancel { order_id: i64 },
    /// Confirm receipt of a shipped order whose deadline has passed
    AutoComplete { order_id: i64 },
    /// Leave a default positive review for one product of a completed order
    AutoReview { order_id: i64, product_id: i64 },
}

impl ScheduledAction {
    pub fn order_id(&self) -> i64 {
        match self {
            ScheduledAction::AutoCancel { order_id }
            | ScheduledAction::AutoComplete { order_id }
            | ScheduledAction::AutoReview { order_id, .. } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScheduledAction::AutoCancel { .. } => "auto_cancel",
            ScheduledAction::AutoComplete { .. } => "auto_complete",
            ScheduledAction::AutoReview { .. } => "auto_review",
        }
    }
}

/// Pending job row, keyed by `(due_at, job_id)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledJob {
    /// Assigned on persist
    pub job_id: u64,
    pub due_at: i64,
    pub action: ScheduledAction,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl ScheduledJob {
    pub fn new(action: ScheduledAction, due_at: i64, now: i64) -> Self {
        Self {
            job_id: 0,
            due_at,
            action,
            attempts: 0,
            last_error: None,
            created_at: now,
        }
    }
}

/// Job that exhausted its attempts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeadJob {
    pub job: ScheduledJob,
    pub failed_at: i64,
    pub last_error: String,
}
