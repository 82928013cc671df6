//! Progress model - a learner's position within a project.

use serde::{Deserialize, Serialize};
use crate::id::{LearnerId, ProjectId};
use crate::Time;

/// Position of a learner within one project.
///
/// `current_step` ranges over `1..=N + 1`; `N + 1` means the project is
/// complete. It only ever moves forward by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Learner
    pub learner_id: LearnerId,

    /// Project
    pub project_id: ProjectId,

    /// Step currently being attempted (1-based)
    pub current_step: u32,

    /// Last updated
    pub updated_at: Time,
}

impl Progress {
    /// Fresh progress at step 1.
    pub fn new(learner_id: LearnerId, project_id: ProjectId) -> Self {
        Self {
            learner_id,
            project_id,
            current_step: 1,
            updated_at: chrono::Utc::now(),
        }
    }

    /// The record after one successful step.
    pub fn advanced(&self) -> Self {
        Self {
            learner_id: self.learner_id,
            project_id: self.project_id,
            current_step: self.current_step.saturating_add(1),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Number of steps passed so far.
    pub fn completed_steps(&self) -> u32 {
        self.current_step.saturating_sub(1)
    }

    /// Whether every one of `step_count` steps has been passed.
    pub fn is_complete(&self, step_count: u32) -> bool {
        self.current_step > step_count
    }
}

/// Outcome of judging an explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The explanation demonstrates the required concept
    Pass,
    /// Anything else, including judge failures
    Fail,
}

impl Verdict {
    /// Whether this is a PASS.
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Reply returned to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Reply text
    pub reply: String,
}

impl Reply {
    /// Wrap reply text.
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_starts_at_one() {
        let progress = Progress::new(LearnerId::new(), ProjectId::new());
        assert_eq!(progress.current_step, 1);
        assert_eq!(progress.completed_steps(), 0);
    }

    #[test]
    fn test_advanced_moves_by_one() {
        let progress = Progress::new(LearnerId::new(), ProjectId::new());
        let next = progress.advanced();
        assert_eq!(next.current_step, 2);
        assert_eq!(next.learner_id, progress.learner_id);
        assert_eq!(next.project_id, progress.project_id);
    }

    #[test]
    fn test_is_complete() {
        let mut progress = Progress::new(LearnerId::new(), ProjectId::new());
        assert!(!progress.is_complete(2));
        progress.current_step = 3;
        assert!(progress.is_complete(2));
        assert_eq!(progress.completed_steps(), 2);
    }
}
