//! Inference gateway trait and outcome type.

use std::time::Duration;

use async_trait::async_trait;

use crate::pipeline::types::Sender;

/// Recorded as the response when a call exceeds its time bound.
pub const TIMEOUT_FALLBACK: &str =
    "LLM Timeout: Default response triggered. Escalate to caregiver.";

/// How one inference call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceOutcome {
    /// Zero exit status; trimmed standard output.
    Completed(String),
    /// Non-zero exit status with captured diagnostics.
    Failed { code: i32, stderr: String },
    /// The wall-clock bound elapsed; the process was killed.
    TimedOut { after: Duration },
    /// The process could not be run at all.
    Error(String),
}

impl InferenceOutcome {
    /// Text written to the communication log as the response.
    pub fn response_text(&self) -> String {
        match self {
            Self::Completed(text) => text.clone(),
            Self::Failed { code, stderr } => format!("LLM failed with code {code}: {stderr}"),
            Self::TimedOut { .. } => TIMEOUT_FALLBACK.to_string(),
            Self::Error(reason) => format!("LLM Error: {reason}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Error(_) => "error",
        }
    }
}

/// Asks an external model what to do about one escalation.
///
/// Implementations never return an error: every failure mode is folded into
/// an [`InferenceOutcome`].
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Model identifier used for calls.
    fn model_name(&self) -> &str;

    async fn infer(&self, sender: Sender, subject: &str, message: &str) -> InferenceOutcome;
}

/// Prompt sent to the model for one escalation.
pub fn build_prompt(sender: Sender, message: &str) -> String {
    format!("[{sender}] {message}\nRespond with action.")
}
