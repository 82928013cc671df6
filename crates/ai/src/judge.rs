//! Judge - decides whether an explanation demonstrates a step's concept.
//!
//! Fail-closed: any transport error, timeout, or unrecognizable output is a
//! FAIL verdict. The judge never returns an error to its caller.

use std::sync::Arc;

use stepwise_core::{SamplingConfig, Verdict};
use tracing::{debug, warn};

use crate::reasoning::{ReasoningError, ReasoningService, Result};

/// Build the evaluation instruction for one message.
pub fn judge_prompt(required_concept: &str, user_message: &str) -> String {
    format!(
        r#"Role: Strict Code Logic Examiner.
Current Goal: "{required_concept}"
User Message: "{user_message}"

INSTRUCTIONS:
- Did the user correctly identify the logic/variables/data structure required?
- If they asked for code, help, or are vague -> FAIL
- If they explained it correctly -> PASS

OUTPUT ONLY: PASS or FAIL"#
    )
}

/// Map raw model output to a verdict.
///
/// Output is trimmed and upper-cased; containing `PASS` anywhere is a pass,
/// so verbose answers like "Verdict: pass." are tolerated.
pub fn parse_verdict(output: &str) -> Verdict {
    if output.trim().to_uppercase().contains("PASS") {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}

/// Judge backed by a reasoning service.
#[derive(Clone)]
pub struct Judge {
    service: Arc<dyn ReasoningService>,
    sampling: SamplingConfig,
}

impl Judge {
    /// Create a judge.
    pub fn new(service: Arc<dyn ReasoningService>, sampling: SamplingConfig) -> Self {
        Self { service, sampling }
    }

    /// Judge `user_message` against `required_concept`. Never fails.
    pub async fn judge(&self, required_concept: &str, user_message: &str) -> Verdict {
        match self.try_judge(required_concept, user_message).await {
            Ok(verdict) => {
                debug!("Verdict: {:?}", verdict);
                verdict
            }
            Err(e) => {
                warn!("Judge unavailable, treating as FAIL: {}", e);
                Verdict::Fail
            }
        }
    }

    async fn try_judge(&self, required_concept: &str, user_message: &str) -> Result<Verdict> {
        let prompt = judge_prompt(required_concept, user_message);
        let timeout = self.sampling.timeout();

        let output = tokio::time::timeout(
            timeout,
            self.service
                .complete(&prompt, self.sampling.temperature, self.sampling.max_tokens),
        )
        .await
        .map_err(|_| ReasoningError::Timeout(timeout))??;

        Ok(parse_verdict(&output))
    }
}
