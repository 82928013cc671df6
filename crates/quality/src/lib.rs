//! Output quality gates.
//!
//! Currently a single gate: the safety filter that keeps reference code out
//! of tutor hints.

#![warn(missing_docs)]

pub mod safety;

pub use safety::{fallback_message, PatternError, SafetyFilter};
