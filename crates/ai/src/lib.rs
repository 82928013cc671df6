//! Reasoning service integration.
//!
//! The judge that gates each step and the tutor that writes hints, both
//! speaking to an injected [`ReasoningService`].

#![warn(missing_docs)]

pub mod reasoning;
pub mod judge;
pub mod tutor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use reasoning::{OllamaClient, ReasoningError, ReasoningService};
pub use judge::{judge_prompt, parse_verdict, Judge};
pub use tutor::{persona_for, tutor_prompt, HintRequest, TutorGenerator};
