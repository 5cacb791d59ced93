//! Persistent delayed-task queue. Tasks carry a firing time and a handler
//! function identifier; a 1 s tick engine pulls due tasks and forwards them
//! for delivery.

pub mod db;
pub mod engine;
pub mod error;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::SchedulerError;
pub use types::{DelayedTask, TaskFunction};
