//! JSON file storage implementation.
//!
//! Stores data as JSON files under a data directory:
//!
//! ```text
//! <root>/projects/<project>.json
//! <root>/learners/<learner>.json
//! <root>/progress/<learner>/<project>.json
//! ```
//!
//! Every write goes to a temp file that is then renamed over the target, so a
//! record is either fully old or fully new. Writes are serialized by a
//! store-wide lock, which makes `advance` a compare-and-swap.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use stepwise_core::{
    normalize_email, Learner, LearnerId, Progress, Project, ProjectId, Tier,
};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::trait_::{conflict, missing_progress, LearnerStore, ProgressStore, ProjectCatalog};
use super::{Result, StorageError};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Open (creating if needed) a data directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("projects")).await?;
        fs::create_dir_all(root.join("learners")).await?;
        fs::create_dir_all(root.join("progress")).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_path(&self, id: ProjectId) -> PathBuf {
        self.root.join("projects").join(format!("{}.json", id))
    }

    fn learner_path(&self, id: LearnerId) -> PathBuf {
        self.root.join("learners").join(format!("{}.json", id))
    }

    fn learner_progress_dir(&self, learner_id: LearnerId) -> PathBuf {
        self.root.join("progress").join(learner_id.to_string())
    }

    fn progress_path(&self, learner_id: LearnerId, project_id: ProjectId) -> PathBuf {
        self.learner_progress_dir(learner_id)
            .join(format!("{}.json", project_id))
    }
}

#[async_trait]
impl ProjectCatalog for JsonStorage {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        read_json(&self.project_path(id)).await
    }

    async fn list_projects(&self, difficulty: Option<Tier>) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = list_dir(&self.root.join("projects")).await?;
        projects.retain(|p| difficulty.map_or(true, |d| p.difficulty == d));
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(projects)
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        project.validate()?;
        let _guard = self.write_lock.lock().await;
        write_json(&self.project_path(project.id), project).await?;
        debug!("Saved project {} ({})", project.id, project.title);
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for JsonStorage {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<Progress>> {
        read_json(&self.progress_path(learner_id, project_id)).await
    }

    async fn create_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Progress> {
        let _guard = self.write_lock.lock().await;
        let path = self.progress_path(learner_id, project_id);
        if let Some(existing) = read_json(&path).await? {
            return Ok(existing);
        }

        fs::create_dir_all(self.learner_progress_dir(learner_id)).await?;
        let progress = Progress::new(learner_id, project_id);
        write_json(&path, &progress).await?;
        Ok(progress)
    }

    async fn advance(&self, progress: &Progress) -> Result<Progress> {
        let _guard = self.write_lock.lock().await;
        let path = self.progress_path(progress.learner_id, progress.project_id);
        let stored: Progress = read_json(&path)
            .await?
            .ok_or_else(|| missing_progress(progress))?;

        if stored.current_step != progress.current_step {
            return Err(conflict(progress, stored.current_step));
        }

        let next = stored.advanced();
        write_json(&path, &next).await?;
        Ok(next)
    }

    async fn list_for_learner(&self, learner_id: LearnerId) -> Result<Vec<Progress>> {
        list_dir(&self.learner_progress_dir(learner_id)).await
    }
}

#[async_trait]
impl LearnerStore for JsonStorage {
    async fn register(&self, email: &str) -> Result<Learner> {
        let email = normalize_email(email);
        let _guard = self.write_lock.lock().await;

        let learners: Vec<Learner> = list_dir(&self.root.join("learners")).await?;
        if let Some(existing) = learners.into_iter().find(|l| l.email == email) {
            return Ok(existing);
        }

        let learner = Learner::new(&email);
        write_json(&self.learner_path(learner.id), &learner).await?;
        Ok(learner)
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Option<Learner>> {
        read_json(&self.learner_path(id)).await
    }

    async fn set_proficiency(&self, id: LearnerId, tier: Option<Tier>) -> Result<Learner> {
        let _guard = self.write_lock.lock().await;
        let path = self.learner_path(id);
        let mut learner: Learner = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("learner {}", id)))?;
        learner.proficiency = tier;
        write_json(&path, &learner).await?;
        Ok(learner)
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(items),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stepwise_core::StepDraft;
    use tempfile::TempDir;

    fn project() -> Project {
        Project::new(
            "Undo/Redo Text Editor",
            Tier::Beginner,
            "Unlimited undo and redo",
            vec![
                StepDraft {
                    title: "Action Class".to_string(),
                    concept: "A class for one edit action".to_string(),
                    code: "class Action: ...".to_string(),
                },
                StepDraft {
                    title: "Editor Initialization".to_string(),
                    concept: "Two stacks: history and future".to_string(),
                    code: "class TextEditor: ...".to_string(),
                },
            ],
        )
        .with_outline("Two stacks")
    }

    #[tokio::test]
    async fn test_project_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let project = project();
        {
            let storage = JsonStorage::new(dir.path()).await.unwrap();
            storage.save_project(&project).await.unwrap();
        }

        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let loaded = storage.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, project.title);
        assert_eq!(loaded.solution_outline, "Two stacks");
        assert_eq!(loaded.steps, project.steps);

        let step = storage.get_step(project.id, 2).await.unwrap().unwrap();
        assert_eq!(step.title, "Editor Initialization");
        assert!(storage.get_project(ProjectId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_projects_by_difficulty() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.save_project(&project()).await.unwrap();

        assert_eq!(storage.list_projects(None).await.unwrap().len(), 1);
        assert_eq!(storage.list_projects(Some(Tier::Beginner)).await.unwrap().len(), 1);
        assert!(storage.list_projects(Some(Tier::Advanced)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_lifecycle() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let learner = LearnerId::new();
        let project = ProjectId::new();

        assert!(storage.get_progress(learner, project).await.unwrap().is_none());
        assert!(storage.list_for_learner(learner).await.unwrap().is_empty());

        let created = storage.create_progress(learner, project).await.unwrap();
        assert_eq!(created.current_step, 1);

        let advanced = storage.advance(&created).await.unwrap();
        assert_eq!(advanced.current_step, 2);

        let err = storage.advance(&created).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 1, found: 2, .. }));

        let listed = storage.list_for_learner(learner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].current_step, 2);

        let recreated = storage.create_progress(learner, project).await.unwrap();
        assert_eq!(recreated.current_step, 2);
    }

    #[tokio::test]
    async fn test_concurrent_create_yields_one_record() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let learner = LearnerId::new();
        let project = ProjectId::new();

        let first = storage.create_progress(learner, project).await.unwrap();
        storage.advance(&first).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move { storage.create_progress(learner, project).await })
            })
            .collect();

        for handle in handles {
            let progress = handle.await.unwrap().unwrap();
            assert_eq!(progress.current_step, 2);
        }
    }

    #[tokio::test]
    async fn test_learners() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let learner = storage.register("grace@example.com").await.unwrap();
        let again = storage.register("GRACE@example.com").await.unwrap();
        assert_eq!(learner.id, again.id);

        let updated = storage
            .set_proficiency(learner.id, Some(Tier::Intermediate))
            .await
            .unwrap();
        assert_eq!(updated.proficiency, Some(Tier::Intermediate));

        let loaded = storage.get_learner(learner.id).await.unwrap().unwrap();
        assert_eq!(loaded.proficiency, Some(Tier::Intermediate));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        storage.save_project(&project()).await.unwrap();

        let mut rd = fs::read_dir(dir.path().join("projects")).await.unwrap();
        while let Some(entry) = rd.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(name.ends_with(".json"), "unexpected file {}", name);
        }
    }
}
