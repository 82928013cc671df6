//! Learner model.

use serde::{Deserialize, Serialize};
use crate::id::LearnerId;
use crate::project::Tier;
use crate::Time;

/// A learner working through projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    /// Unique identifier
    pub id: LearnerId,

    /// Registration email, stored lowercase
    pub email: String,

    /// Self-reported proficiency; selects the tutor persona
    pub proficiency: Option<Tier>,

    /// When registered
    pub created_at: Time,
}

impl Learner {
    /// Create a learner with no proficiency set.
    pub fn new(email: &str) -> Self {
        Self {
            id: LearnerId::new(),
            email: normalize_email(email),
            proficiency: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Canonical form of an email used for lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
