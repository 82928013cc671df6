//! Step progression
//!
//! The engine that turns a learner message into a reply, and the dashboard
//! that reports per-project completion.

#![warn(missing_docs)]

pub mod dashboard;
pub mod engine;

pub use dashboard::{Dashboard, ProgressSnapshot, ProgressTracker, ProjectProgress};
pub use engine::{unlock_reply, EngineError, ProgressionEngine, COMPLETION_MESSAGE};
