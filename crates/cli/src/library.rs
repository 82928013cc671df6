//! Built-in project library.

use anyhow::{Context, Result};
use serde::Deserialize;
use stepwise_core::{Project, StepDraft, Tier};
use stepwise_storage::ProjectCatalog;
use tracing::{debug, info};

const LIBRARY: &str = include_str!("../fixtures/library.json");

#[derive(Debug, Deserialize)]
struct LibraryEntry {
    title: String,
    difficulty: Tier,
    description: String,
    #[serde(default)]
    solution_outline: String,
    #[serde(default)]
    language: Option<String>,
    steps: Vec<StepDraft>,
}

impl LibraryEntry {
    fn into_project(self) -> Project {
        let project = Project::new(self.title, self.difficulty, self.description, self.steps)
            .with_outline(self.solution_outline);
        match self.language {
            Some(language) => project.with_language(language),
            None => project,
        }
    }
}

/// Parse the embedded library.
pub fn library() -> Result<Vec<Project>> {
    let entries: Vec<LibraryEntry> =
        serde_json::from_str(LIBRARY).context("embedded library is malformed")?;
    Ok(entries.into_iter().map(LibraryEntry::into_project).collect())
}

/// Outcome of seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Projects added
    pub added: usize,
    /// Projects already present (matched by title)
    pub skipped: usize,
}

/// Save every library project whose title is not yet in the catalog.
pub async fn seed(catalog: &dyn ProjectCatalog) -> Result<SeedReport> {
    let existing: Vec<String> = catalog
        .list_projects(None)
        .await?
        .into_iter()
        .map(|p| p.title)
        .collect();

    let mut report = SeedReport::default();
    for project in library()? {
        if existing.contains(&project.title) {
            debug!("Skipping existing project {}", project.title);
            report.skipped += 1;
            continue;
        }
        catalog
            .save_project(&project)
            .await
            .with_context(|| format!("failed to save {}", project.title))?;
        info!("Created: {}", project.title);
        report.added += 1;
    }
    Ok(report)
}
