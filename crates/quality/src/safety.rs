//! Safety filter for tutor output.
//!
//! Two passes, in this order:
//!
//! 1. Leak detection on the raw text. Any configured marker anywhere means
//!    the whole text is discarded and replaced by a fixed hint message.
//! 2. Header stripping. Lines that consist only of an echoed instruction
//!    label (`Instructions:`, `**Goal Logic**`, ...) are dropped.
//!
//! Detection runs before stripping so code following a stripped header is
//! still caught.

use regex::Regex;
use stepwise_core::{LeakMarker, SafetyConfig};
use tracing::warn;

/// Error building the header pattern from configured labels.
pub use regex::Error as PatternError;

/// Message substituted for tutor output that contained code.
pub fn fallback_message(hint: &str) -> String {
    format!(
        "I cannot write the code for you yet. Let's think about the logic first.\n\nHint: {}",
        hint
    )
}

/// Deterministic filter over tutor output.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    markers: Vec<LeakMarker>,
    header_line: Option<Regex>,
}

impl SafetyFilter {
    /// Build a filter from configured markers and header labels.
    pub fn new(config: &SafetyConfig) -> Result<Self, PatternError> {
        let labels: Vec<String> = config
            .header_labels
            .iter()
            .map(|label| label.trim())
            .filter(|label| !label.is_empty())
            .map(regex::escape)
            .collect();

        let header_line = if labels.is_empty() {
            None
        } else {
            // Whole line: optional markdown heading/bold, label, optional colon.
            let pattern = format!(
                r"(?i)^\s*(?:#{{1,6}}\s*)?(?:\*\*)?(?:{})(?:\*\*)?\s*:?\s*(?:\*\*)?\s*$",
                labels.join("|")
            );
            Some(Regex::new(&pattern)?)
        };

        Ok(Self {
            markers: config
                .leak_markers
                .iter()
                .filter(|m| !m.token.is_empty())
                .cloned()
                .collect(),
            header_line,
        })
    }

    /// First leak marker present in `text`, if any.
    pub fn detect_leak(&self, text: &str) -> Option<&LeakMarker> {
        self.markers.iter().find(|m| text.contains(m.token.as_str()))
    }

    /// Whether a line is an echoed instruction header.
    pub fn is_header_line(&self, line: &str) -> bool {
        self.header_line
            .as_ref()
            .is_some_and(|re| re.is_match(line))
    }

    /// Sanitize tutor output, substituting [`fallback_message`] with
    /// `fallback_hint` if any code leaked.
    pub fn sanitize(&self, raw_text: &str, fallback_hint: &str) -> String {
        if let Some(marker) = self.detect_leak(raw_text) {
            warn!(
                "Safety net triggered: {:?} marker {:?} in tutor output, code leak prevented",
                marker.kind, marker.token
            );
            return fallback_message(fallback_hint).trim().to_string();
        }

        let kept: Vec<&str> = raw_text
            .split('\n')
            .filter(|line| !self.is_header_line(line))
            .collect();
        kept.join("\n").trim().to_string()
    }
}

impl Default for SafetyFilter {
    fn default() -> Self {
        // The default labels are plain words, so the pattern always compiles.
        Self::new(&SafetyConfig::default()).unwrap_or(Self {
            markers: SafetyConfig::default().leak_markers,
            header_line: None,
        })
    }
}
