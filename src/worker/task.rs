//! Units of work handed from evaluators to the dispatcher.

use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

use crate::llm::{InferenceOutcome, Severity};
use crate::pipeline::types::{Escalation, Priority, Sender};
use crate::store::CommunicationEntry;

/// One escalation waiting for an inference-backed recommendation.
///
/// Created by an evaluator when a rule fires and consumed exactly once by
/// the dispatcher. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTask {
    pub id: Uuid,
    pub sender: Sender,
    /// Monitored user the escalation concerns.
    pub subject: String,
    pub message: String,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
}

impl EscalationTask {
    pub fn new(
        sender: Sender,
        subject: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            subject: subject.into(),
            message: message.into(),
            priority,
            enqueued_at: Utc::now(),
        }
    }

    pub fn from_escalation(
        sender: Sender,
        subject: impl Into<String>,
        escalation: Escalation,
    ) -> Self {
        Self::new(sender, subject, escalation.message, escalation.priority)
    }
}

/// Terminal record of one dispatched task.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub task: EscalationTask,
    pub outcome: InferenceOutcome,
    /// Response as logged; failures are rendered into text.
    pub response: String,
    pub severity: Severity,
    pub completed_at: DateTime<Local>,
}

impl DispatchResult {
    pub fn new(task: EscalationTask, outcome: InferenceOutcome) -> Self {
        let response = outcome.response_text();
        let severity = match outcome {
            InferenceOutcome::TimedOut { .. } => Severity::High,
            _ => Severity::classify(&response),
        };
        Self {
            task,
            outcome,
            response,
            severity,
            completed_at: Local::now(),
        }
    }

    pub fn to_log_entry(&self) -> CommunicationEntry {
        CommunicationEntry {
            sender: self.task.sender.to_string(),
            subject: self.task.subject.clone(),
            message: self.task.message.clone(),
            response: self.response.clone(),
            timestamp: self.completed_at.naive_local(),
        }
    }
}
