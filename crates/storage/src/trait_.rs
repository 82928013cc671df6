//! Storage trait abstractions.
//!
//! The engine only sees three narrow interfaces: a read-mostly project
//! catalog, a progress store keyed by (learner, project), and a learner
//! registry. All take `&self` so one backend can be shared behind an `Arc`
//! by concurrent requests; implementations serialize writes internally.

use async_trait::async_trait;
use stepwise_core::{
    CatalogError, Learner, LearnerId, Progress, Project, ProjectId, Step, Tier,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Project failed validation on save
    #[error("invalid catalog: {0}")]
    InvalidCatalog(#[from] CatalogError),

    /// Progress moved underneath the caller
    #[error("progress for learner {learner_id} on project {project_id} is at step {found}, expected {expected}")]
    Conflict {
        /// Learner
        learner_id: LearnerId,
        /// Project
        project_id: ProjectId,
        /// Position the caller read
        expected: u32,
        /// Position actually stored
        found: u32,
    },

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Read access to seeded projects.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    /// Load a project by ID.
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Load the step at a 1-based position.
    async fn get_step(&self, project_id: ProjectId, position: u32) -> Result<Option<Step>> {
        Ok(self
            .get_project(project_id)
            .await?
            .and_then(|project| project.step(position).cloned()))
    }

    /// List projects, optionally only those of one difficulty.
    async fn list_projects(&self, difficulty: Option<Tier>) -> Result<Vec<Project>>;

    /// Store a project. Rejects projects whose step positions are not 1..=N.
    async fn save_project(&self, project: &Project) -> Result<()>;
}

/// Durable per-(learner, project) step positions.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load progress, if the learner has started the project.
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<Progress>>;

    /// Get-or-insert progress at step 1. Concurrent callers observe the same record.
    async fn create_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Progress>;

    /// Atomically move `progress` forward by one step.
    ///
    /// Fails with [`StorageError::Conflict`] if the stored position no longer
    /// equals `progress.current_step`, and [`StorageError::NotFound`] if there
    /// is no stored record.
    async fn advance(&self, progress: &Progress) -> Result<Progress>;

    /// All progress records of one learner.
    async fn list_for_learner(&self, learner_id: LearnerId) -> Result<Vec<Progress>>;
}

/// Learner registry.
#[async_trait]
pub trait LearnerStore: Send + Sync {
    /// Find a learner by email, registering them if absent.
    async fn register(&self, email: &str) -> Result<Learner>;

    /// Load a learner by ID.
    async fn get_learner(&self, id: LearnerId) -> Result<Option<Learner>>;

    /// Update a learner's proficiency tier.
    async fn set_proficiency(&self, id: LearnerId, tier: Option<Tier>) -> Result<Learner>;
}

pub(crate) fn conflict(progress: &Progress, found: u32) -> StorageError {
    StorageError::Conflict {
        learner_id: progress.learner_id,
        project_id: progress.project_id,
        expected: progress.current_step,
        found,
    }
}

pub(crate) fn missing_progress(progress: &Progress) -> StorageError {
    StorageError::NotFound(format!(
        "progress for learner {} on project {}",
        progress.learner_id, progress.project_id
    ))
}
