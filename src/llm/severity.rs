//! Keyword severity heuristic for model responses.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static HIGH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(immediate|emergency|critical)").expect("valid regex"));

static MEDIUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(should|check|notify)").expect("valid regex"));

/// Rough urgency of a recommended action, read from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn classify(response: &str) -> Self {
        if response.trim().is_empty() {
            Severity::Unknown
        } else if HIGH.is_match(response) {
            Severity::High
        } else if MEDIUM.is_match(response) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}
