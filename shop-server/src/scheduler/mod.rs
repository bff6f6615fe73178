//! Durable deferred actions and the worker that fires them

mod job;
mod worker;

pub use job::{DeadJob, ScheduledAction, ScheduledJob};
pub use worker::JobWorker;
