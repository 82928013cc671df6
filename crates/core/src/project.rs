//! Project model - a curriculum of gated steps.

use serde::{Deserialize, Serialize};
use crate::id::ProjectId;
use crate::Time;

/// Difficulty / proficiency tier.
///
/// Used both as a project's difficulty and as a learner's proficiency.
/// Ordered from most guided to least guided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// New to data structures
    Beginner,
    /// Comfortable with the basics
    Intermediate,
    /// Working developer
    Advanced,
}

impl Tier {
    /// All tiers, in order.
    pub const ALL: [Tier; 3] = [Tier::Beginner, Tier::Intermediate, Tier::Advanced];

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Beginner => "beginner",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
        }
    }

    /// Parse a tier name, case-insensitively. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gated unit of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position within the project
    pub position: u32,

    /// Step title
    pub title: String,

    /// What the learner must articulate to pass
    pub required_concept: String,

    /// Reference implementation released on PASS
    pub unlock_code: String,
}

/// Step contents before a position is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDraft {
    /// Step title
    pub title: String,

    /// Required concept
    pub concept: String,

    /// Unlock code
    pub code: String,
}

/// A project is an ordered sequence of steps. Immutable after seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,

    /// Project title
    pub title: String,

    /// Difficulty tier
    pub difficulty: Tier,

    /// Description
    pub description: String,

    /// High-level approach of the full solution
    #[serde(default)]
    pub solution_outline: String,

    /// Fence tag used when revealing unlock code
    #[serde(default = "default_language")]
    pub language: String,

    /// Steps, ordered by position
    pub steps: Vec<Step>,

    /// When seeded
    pub created_at: Time,
}

fn default_language() -> String {
    "python".to_string()
}

/// Catalog validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Project has no steps
    #[error("project '{0}' has no steps")]
    Empty(String),

    /// Positions are not 1..=N
    #[error("project '{title}': expected step position {expected}, found {found}")]
    PositionGap {
        /// Project title
        title: String,
        /// Position expected at this index
        expected: u32,
        /// Position found
        found: u32,
    },
}

impl Project {
    /// Build a project, assigning dense 1-based positions to the drafts.
    pub fn new(
        title: impl Into<String>,
        difficulty: Tier,
        description: impl Into<String>,
        drafts: Vec<StepDraft>,
    ) -> Self {
        let steps = drafts
            .into_iter()
            .zip(1u32..)
            .map(|(draft, position)| Step {
                position,
                title: draft.title,
                required_concept: draft.concept,
                unlock_code: draft.code,
            })
            .collect();

        Self {
            id: ProjectId::new(),
            title: title.into(),
            difficulty,
            description: description.into(),
            solution_outline: String::new(),
            language: default_language(),
            steps,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set the solution outline.
    pub fn with_outline(mut self, outline: impl Into<String>) -> Self {
        self.solution_outline = outline.into();
        self
    }

    /// Set the code fence language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Check that step positions form the contiguous range 1..=N.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.steps.is_empty() {
            return Err(CatalogError::Empty(self.title.clone()));
        }
        for (step, expected) in self.steps.iter().zip(1u32..) {
            if step.position != expected {
                return Err(CatalogError::PositionGap {
                    title: self.title.clone(),
                    expected,
                    found: step.position,
                });
            }
        }
        Ok(())
    }

    /// Step at a 1-based position.
    pub fn step(&self, position: u32) -> Option<&Step> {
        let index = usize::try_from(position.checked_sub(1)?).ok()?;
        self.steps.get(index)
    }

    /// Number of steps.
    pub fn step_count(&self) -> u32 {
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }
}
