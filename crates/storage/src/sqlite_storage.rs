//! SQLite storage backend for Stepwise.
//!
//! Projects and learners are stored as JSON documents; progress is stored as
//! plain columns so that `advance` can be a single conditional `UPDATE`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use stepwise_core::{
    normalize_email, Learner, LearnerId, Progress, Project, ProjectId, Tier,
};

use super::trait_::{conflict, missing_progress, LearnerStore, ProgressStore, ProjectCatalog};
use super::{Result, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

impl SqliteStorage {
    /// Open (creating if missing) a database file.
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_path)
            .map_err(db_err)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        // One connection: each `:memory:` connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                difficulty TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS learners (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS progress (
                learner_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                current_step INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (learner_id, project_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    fn progress_from_row(row: &SqliteRow) -> Result<Progress> {
        let learner_id: String = row.try_get("learner_id").map_err(db_err)?;
        let project_id: String = row.try_get("project_id").map_err(db_err)?;
        let current_step: i64 = row.try_get("current_step").map_err(db_err)?;
        let updated_at: String = row.try_get("updated_at").map_err(db_err)?;

        Ok(Progress {
            learner_id: learner_id
                .parse()
                .map_err(|e| StorageError::Other(format!("bad learner id: {}", e)))?,
            project_id: project_id
                .parse()
                .map_err(|e| StorageError::Other(format!("bad project id: {}", e)))?,
            current_step: u32::try_from(current_step)
                .map_err(|_| StorageError::Other(format!("bad step {}", current_step)))?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| StorageError::Other(e.to_string()))?,
        })
    }

    async fn fetch_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<Progress>> {
        let row = sqlx::query(
            "SELECT learner_id, project_id, current_step, updated_at FROM progress
            WHERE learner_id = ? AND project_id = ?",
        )
        .bind(learner_id.to_string())
        .bind(project_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::progress_from_row).transpose()
    }

    async fn fetch_learner_by_email(&self, email: &str) -> Result<Option<Learner>> {
        let row = sqlx::query("SELECT data FROM learners WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProjectCatalog for SqliteStorage {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT data FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_projects(&self, difficulty: Option<Tier>) -> Result<Vec<Project>> {
        let rows = match difficulty {
            Some(tier) => {
                sqlx::query(
                    "SELECT data FROM projects WHERE difficulty = ? ORDER BY created_at, id",
                )
                .bind(tier.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT data FROM projects ORDER BY created_at, id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        project.validate()?;
        let data = serde_json::to_string(project)?;

        sqlx::query(
            "INSERT OR REPLACE INTO projects (id, difficulty, data, created_at)
            VALUES (?, ?, ?, ?)",
        )
        .bind(project.id.to_string())
        .bind(project.difficulty.as_str())
        .bind(data)
        .bind(project.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl ProgressStore for SqliteStorage {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Option<Progress>> {
        self.fetch_progress(learner_id, project_id).await
    }

    async fn create_progress(
        &self,
        learner_id: LearnerId,
        project_id: ProjectId,
    ) -> Result<Progress> {
        sqlx::query(
            "INSERT INTO progress (learner_id, project_id, current_step, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT (learner_id, project_id) DO NOTHING",
        )
        .bind(learner_id.to_string())
        .bind(project_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.fetch_progress(learner_id, project_id)
            .await?
            .ok_or_else(|| StorageError::Other("progress vanished after insert".to_string()))
    }

    async fn advance(&self, progress: &Progress) -> Result<Progress> {
        let result = sqlx::query(
            "UPDATE progress SET current_step = current_step + 1, updated_at = ?
            WHERE learner_id = ? AND project_id = ? AND current_step = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(progress.learner_id.to_string())
        .bind(progress.project_id.to_string())
        .bind(i64::from(progress.current_step))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let stored = self
            .fetch_progress(progress.learner_id, progress.project_id)
            .await?
            .ok_or_else(|| missing_progress(progress))?;

        if result.rows_affected() == 0 {
            return Err(conflict(progress, stored.current_step));
        }
        Ok(stored)
    }

    async fn list_for_learner(&self, learner_id: LearnerId) -> Result<Vec<Progress>> {
        let rows = sqlx::query(
            "SELECT learner_id, project_id, current_step, updated_at FROM progress
            WHERE learner_id = ?",
        )
        .bind(learner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::progress_from_row).collect()
    }
}

#[async_trait]
impl LearnerStore for SqliteStorage {
    async fn register(&self, email: &str) -> Result<Learner> {
        let email = normalize_email(email);
        let learner = Learner::new(&email);
        let data = serde_json::to_string(&learner)?;

        sqlx::query(
            "INSERT INTO learners (id, email, data) VALUES (?, ?, ?)
            ON CONFLICT (email) DO NOTHING",
        )
        .bind(learner.id.to_string())
        .bind(&email)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.fetch_learner_by_email(&email)
            .await?
            .ok_or_else(|| StorageError::Other("learner vanished after insert".to_string()))
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Option<Learner>> {
        let row = sqlx::query("SELECT data FROM learners WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn set_proficiency(&self, id: LearnerId, tier: Option<Tier>) -> Result<Learner> {
        let mut learner = self
            .get_learner(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("learner {}", id)))?;
        learner.proficiency = tier;

        sqlx::query("UPDATE learners SET data = ? WHERE id = ?")
            .bind(serde_json::to_string(&learner)?)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(learner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::StepDraft;

    fn project(difficulty: Tier) -> Project {
        Project::new(
            "High-Speed LRU Cache",
            difficulty,
            "Evict the least recently used item",
            vec![StepDraft {
                title: "Doubly Linked Node".to_string(),
                concept: "Key, value, prev and next pointers".to_string(),
                code: "class DNode: ...".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_catalog() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let advanced = project(Tier::Advanced);
        storage.save_project(&advanced).await.unwrap();
        storage.save_project(&project(Tier::Beginner)).await.unwrap();

        let loaded = storage.get_project(advanced.id).await.unwrap().unwrap();
        assert_eq!(loaded.steps, advanced.steps);

        let filtered = storage.list_projects(Some(Tier::Advanced)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(storage.list_projects(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_progress_compare_and_swap() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let learner = LearnerId::new();
        let project = ProjectId::new();

        let created = storage.create_progress(learner, project).await.unwrap();
        let again = storage.create_progress(learner, project).await.unwrap();
        assert_eq!(created.current_step, 1);
        assert_eq!(again.current_step, 1);

        let advanced = storage.advance(&created).await.unwrap();
        assert_eq!(advanced.current_step, 2);

        let err = storage.advance(&created).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 1, found: 2, .. }));

        let orphan = Progress::new(LearnerId::new(), project);
        assert!(matches!(
            storage.advance(&orphan).await,
            Err(StorageError::NotFound(_))
        ));

        assert_eq!(storage.list_for_learner(learner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_learners() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let learner = storage.register("linus@example.com").await.unwrap();
        let again = storage.register(" Linus@Example.com").await.unwrap();
        assert_eq!(learner.id, again.id);

        let updated = storage
            .set_proficiency(learner.id, Some(Tier::Advanced))
            .await
            .unwrap();
        assert_eq!(updated.proficiency, Some(Tier::Advanced));
        assert_eq!(
            storage.get_learner(learner.id).await.unwrap().unwrap().proficiency,
            Some(Tier::Advanced)
        );
    }
}
