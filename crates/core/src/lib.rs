//! Stepwise core data models.
//!
//! Projects are ordered sequences of steps; a learner's progress through a
//! project is a single step position that only ever moves forward.

#![warn(missing_docs)]

mod id;
mod learner;
mod progress;
mod project;

pub mod config;

pub use id::{LearnerId, ProjectId};
pub use learner::{normalize_email, Learner};
pub use progress::{Progress, Reply, Verdict};
pub use project::{CatalogError, Project, Step, StepDraft, Tier};
pub use config::{
    ConfigError, LeakKind, LeakMarker, ReasoningConfig, SafetyConfig, SamplingConfig,
    StepwiseConfig, StorageConfig,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
