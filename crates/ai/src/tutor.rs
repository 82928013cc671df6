//! Tutor generator - Socratic hints for a learner who has not passed yet.

use std::sync::Arc;

use stepwise_core::{SamplingConfig, Tier};
use tracing::debug;

use crate::reasoning::{ReasoningError, ReasoningService, Result};

/// Persona directives keyed by proficiency.
const PERSONAS: [(Tier, &str); 3] = [
    (
        Tier::Beginner,
        "You are a patient mentor for a beginner. Use everyday analogies, \
         avoid jargon, and encourage the learner after every answer.",
    ),
    (
        Tier::Intermediate,
        "You are a technical tutor for an intermediate developer. Be concise \
         and precise, and name the relevant data structures and complexity.",
    ),
    (
        Tier::Advanced,
        "You are a senior developer pairing with a peer. Be direct, skip the \
         basics, and focus on edge cases and trade-offs.",
    ),
];

/// Persona directive for a tier. Absent tiers get the most guided persona.
pub fn persona_for(tier: Option<Tier>) -> &'static str {
    let tier = tier.unwrap_or(Tier::Beginner);
    PERSONAS
        .iter()
        .find(|(t, _)| *t == tier)
        .map(|(_, persona)| *persona)
        .unwrap_or(PERSONAS[0].1)
}

/// Everything the tutor prompt is built from.
#[derive(Debug, Clone)]
pub struct HintRequest<'a> {
    /// Project title
    pub project_title: &'a str,
    /// Position of the step the learner is stuck on
    pub step_position: u32,
    /// Step title
    pub step_title: &'a str,
    /// Required concept of the step
    pub concept: &'a str,
    /// The learner's latest message
    pub user_message: &'a str,
    /// Learner proficiency, if known
    pub proficiency: Option<Tier>,
}

/// Build the tutor instruction.
pub fn tutor_prompt(request: &HintRequest<'_>) -> String {
    format!(
        r#"{persona}

You are a Socratic Tutor for project: "{project}".
The user is stuck on Step {position}: "{step}".
Goal Logic: "{concept}"
User Message: "{message}"

INSTRUCTIONS:
1. Explain the CONCEPT only, in a few sentences.
2. Ask exactly one guiding question about the variables or structure needed.
3. DO NOT WRITE CODE.
4. Do not repeat these section headers in your answer."#,
        persona = persona_for(request.proficiency),
        project = request.project_title,
        position = request.step_position,
        step = request.step_title,
        concept = request.concept,
        message = request.user_message,
    )
}

/// Hint generator backed by a reasoning service.
#[derive(Clone)]
pub struct TutorGenerator {
    service: Arc<dyn ReasoningService>,
    sampling: SamplingConfig,
}

impl TutorGenerator {
    /// Create a generator.
    pub fn new(service: Arc<dyn ReasoningService>, sampling: SamplingConfig) -> Self {
        Self { service, sampling }
    }

    /// Generate raw guidance. The caller must pass it through the safety filter.
    pub async fn generate_hint(&self, request: &HintRequest<'_>) -> Result<String> {
        let prompt = tutor_prompt(request);
        let timeout = self.sampling.timeout();
        debug!(
            "Generating hint for step {} of {:?} ({:?} persona)",
            request.step_position, request.project_title, request.proficiency
        );

        let text = tokio::time::timeout(
            timeout,
            self.service
                .complete(&prompt, self.sampling.temperature, self.sampling.max_tokens),
        )
        .await
        .map_err(|_| ReasoningError::Timeout(timeout))??;

        if text.trim().is_empty() {
            return Err(ReasoningError::EmptyResponse);
        }
        Ok(text)
    }
}
