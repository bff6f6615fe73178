//! Core module - configuration, state and background tasks
//!
//! - [`Config`] - environment configuration
//! - [`ServerState`] - storage and order entry point
//! - [`EventRouter`] - notification fan-out
//! - [`BackgroundTasks`] - background task management

pub mod config;
pub mod event_router;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use event_router::{EventChannels, EventRouter};
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
