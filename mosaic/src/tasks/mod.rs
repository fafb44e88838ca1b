//! Background task engine
//!
//! Submitting work returns a task id immediately. The work runs on its own
//! tokio task and the engine records pending -> running -> completed/failed.

pub mod engine;
pub mod task;

pub use engine::{TaskEngine, TaskEngineConfig};
pub use task::{Task, TaskStatus};
