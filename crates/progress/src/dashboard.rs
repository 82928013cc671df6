//! Learner dashboard: per-project completion derived from progress records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stepwise_core::{LearnerId, Progress, Project, ProjectId};
use stepwise_storage::{ProgressStore, ProjectCatalog, Result};
use tracing::warn;

/// Progress tracking over the catalog.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Progress of one learner on one project, if started.
    async fn project_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<ProjectProgress>>;

    /// Summary of every started project for a learner.
    async fn summary(&self, learner_id: LearnerId) -> Result<ProgressSnapshot>;
}

/// Completion of one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectProgress {
    /// Project ID
    pub project_id: ProjectId,
    /// Project title
    pub title: String,
    /// Steps passed
    pub completed_steps: u32,
    /// Steps in the project
    pub total_steps: u32,
    /// Completed share, 0 to 100
    pub percentage: f32,
    /// All steps passed
    pub complete: bool,
}

impl ProjectProgress {
    fn from_record(project: &Project, progress: &Progress) -> Self {
        let total = project.step_count();
        let completed = progress.completed_steps().min(total);
        Self {
            project_id: project.id,
            title: project.title.clone(),
            completed_steps: completed,
            total_steps: total,
            percentage: percentage(completed, total),
            complete: progress.is_complete(total),
        }
    }
}

/// A snapshot of a learner's progress at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// When snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Learner ID
    pub learner_id: LearnerId,

    /// Started projects, in title order
    pub projects: Vec<ProjectProgress>,

    /// Completed share over started projects only
    pub overall_percentage: f32,
}

fn percentage(completed: u32, total: u32) -> f32 {
    if total > 0 {
        (completed as f32 / total as f32) * 100.0
    } else {
        0.0
    }
}

/// Dashboard backed by the catalog and progress store.
pub struct Dashboard {
    catalog: Arc<dyn ProjectCatalog>,
    progress: Arc<dyn ProgressStore>,
}

impl Dashboard {
    /// Create a dashboard.
    pub fn new(catalog: Arc<dyn ProjectCatalog>, progress: Arc<dyn ProgressStore>) -> Self {
        Self { catalog, progress }
    }
}

#[async_trait]
impl ProgressTracker for Dashboard {
    async fn project_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<ProjectProgress>> {
        let Some(project) = self.catalog.get_project(project_id).await? else {
            return Ok(None);
        };
        let progress = self.progress.get_progress(learner_id, project_id).await?;
        Ok(progress.map(|p| ProjectProgress::from_record(&project, &p)))
    }

    async fn summary(&self, learner_id: LearnerId) -> Result<ProgressSnapshot> {
        let mut projects = Vec::new();

        for record in self.progress.list_for_learner(learner_id).await? {
            match self.catalog.get_project(record.project_id).await? {
                Some(project) => projects.push(ProjectProgress::from_record(&project, &record)),
                None => warn!(
                    "Progress for learner {} references missing project {}",
                    learner_id, record.project_id
                ),
            }
        }
        projects.sort_by(|a, b| a.title.cmp(&b.title));

        let completed: u32 = projects.iter().map(|p| p.completed_steps).sum();
        let total: u32 = projects.iter().map(|p| p.total_steps).sum();

        Ok(ProgressSnapshot {
            timestamp: Utc::now(),
            learner_id,
            projects,
            overall_percentage: percentage(completed, total),
        })
    }
}
