//! In-memory storage backend.
//!
//! Nothing survives the process. Used by tests and as the default when no
//! data directory is wanted.

use std::collections::HashMap;

use async_trait::async_trait;
use stepwise_core::{
    normalize_email, Learner, LearnerId, Progress, Project, ProjectId, Tier,
};
use tokio::sync::{Mutex, RwLock};

use super::trait_::{conflict, missing_progress, LearnerStore, ProgressStore, ProjectCatalog};
use super::{Result, StorageError};

/// In-memory backend implementing every storage trait.
#[derive(Default)]
pub struct MemoryStorage {
    projects: RwLock<HashMap<ProjectId, Project>>,
    progress: Mutex<HashMap<(LearnerId, ProjectId), Progress>>,
    learners: Mutex<HashMap<LearnerId, Learner>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectCatalog for MemoryStorage {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn list_projects(&self, difficulty: Option<Tier>) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .read()
            .await
            .values()
            .filter(|p| difficulty.map_or(true, |d| p.difficulty == d))
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(projects)
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        project.validate()?;
        self.projects.write().await.insert(project.id, project.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryStorage {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<Progress>> {
        Ok(self.progress.lock().await.get(&(learner_id, project_id)).cloned())
    }

    async fn create_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Progress> {
        let mut records = self.progress.lock().await;
        let progress = records
            .entry((learner_id, project_id))
            .or_insert_with(|| Progress::new(learner_id, project_id));
        Ok(progress.clone())
    }

    async fn advance(&self, progress: &Progress) -> Result<Progress> {
        let mut records = self.progress.lock().await;
        let stored = records
            .get_mut(&(progress.learner_id, progress.project_id))
            .ok_or_else(|| missing_progress(progress))?;

        if stored.current_step != progress.current_step {
            return Err(conflict(progress, stored.current_step));
        }

        *stored = stored.advanced();
        Ok(stored.clone())
    }

    async fn list_for_learner(&self, learner_id: LearnerId) -> Result<Vec<Progress>> {
        Ok(self
            .progress
            .lock()
            .await
            .values()
            .filter(|p| p.learner_id == learner_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LearnerStore for MemoryStorage {
    async fn register(&self, email: &str) -> Result<Learner> {
        let email = normalize_email(email);
        let mut learners = self.learners.lock().await;
        if let Some(existing) = learners.values().find(|l| l.email == email) {
            return Ok(existing.clone());
        }
        let learner = Learner::new(&email);
        learners.insert(learner.id, learner.clone());
        Ok(learner)
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Option<Learner>> {
        Ok(self.learners.lock().await.get(&id).cloned())
    }

    async fn set_proficiency(&self, id: LearnerId, tier: Option<Tier>) -> Result<Learner> {
        let mut learners = self.learners.lock().await;
        let learner = learners
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("learner {}", id)))?;
        learner.proficiency = tier;
        Ok(learner.clone())
    }
}
