//! Shared types for the alert evaluation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Domains and senders ─────────────────────────────────────────────

/// Record category; each has its own evaluator, table and alert budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Health,
    Safety,
    Reminder,
}

impl Domain {
    /// All domains in evaluation order.
    pub fn all() -> &'static [Domain] {
        &[Domain::Health, Domain::Safety, Domain::Reminder]
    }

    /// The evaluator identity that escalates records of this domain.
    pub fn sender(self) -> Sender {
        match self {
            Domain::Health => Sender::HealthAgent,
            Domain::Safety => Sender::SafetyAgent,
            Domain::Reminder => Sender::ReminderAgent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Health => "health",
            Domain::Safety => "safety",
            Domain::Reminder => "reminder",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which evaluator produced an escalation.
///
/// Rendered with the agent names the communication log is filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    HealthAgent,
    SafetyAgent,
    ReminderAgent,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::HealthAgent => "HealthAgent",
            Sender::SafetyAgent => "SafetyAgent",
            Sender::ReminderAgent => "ReminderAgent",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Escalation decision ─────────────────────────────────────────────

/// How urgently a human should look at the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Routine,
    Urgent,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Routine => "routine",
            Priority::Urgent => "urgent",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A fired rule: the message to send for inference and how to treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    /// Short label of the rule case that matched (for logs).
    pub rule: &'static str,
    pub message: String,
    pub priority: Priority,
    /// Also announce locally through the speech notifier.
    pub notify_locally: bool,
}

impl Escalation {
    pub fn new(rule: &'static str, priority: Priority, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            priority,
            notify_locally: false,
        }
    }

    pub fn with_local_notification(mut self) -> Self {
        self.notify_locally = true;
        self
    }
}

// ── Records ─────────────────────────────────────────────────────────

/// One vitals observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub user_id: String,
    pub timestamp: String,
    pub heart_rate: i64,
    pub heart_rate_flag: bool,
    /// Systolic/diastolic as recorded, e.g. "120/80 mmHg".
    pub blood_pressure: String,
    pub blood_pressure_flag: bool,
    pub glucose: i64,
    pub glucose_flag: bool,
    pub oxygen: i64,
    pub oxygen_flag: bool,
    pub alert_triggered: bool,
    pub caregiver_notified: bool,
}

/// One movement / fall observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRecord {
    pub user_id: String,
    pub timestamp: String,
    pub movement: Movement,
    pub fall_detected: bool,
    pub impact: ImpactLevel,
    /// Seconds without movement after a fall, as recorded (may be malformed).
    pub inactivity: String,
    pub location: String,
    pub alert_triggered: bool,
    pub caregiver_notified: bool,
}

/// One scheduled reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub user_id: String,
    pub timestamp: String,
    pub reminder_type: String,
    /// Time of day as recorded, e.g. "08:00:00" (may be malformed).
    pub scheduled_time: String,
    pub sent: bool,
    pub acknowledged: bool,
}

/// A record from any domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum Record {
    Health(HealthRecord),
    Safety(SafetyRecord),
    Reminder(ReminderRecord),
}

impl Record {
    pub fn domain(&self) -> Domain {
        match self {
            Record::Health(_) => Domain::Health,
            Record::Safety(_) => Domain::Safety,
            Record::Reminder(_) => Domain::Reminder,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Record::Health(r) => &r.user_id,
            Record::Safety(r) => &r.user_id,
            Record::Reminder(r) => &r.user_id,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Record::Health(r) => &r.timestamp,
            Record::Safety(r) => &r.timestamp,
            Record::Reminder(r) => &r.timestamp,
        }
    }
}

/// A concrete record type that can be pulled out of a [`Record`].
pub trait DomainRecord: Send + Sync {
    const DOMAIN: Domain;

    fn from_record(record: &Record) -> Option<&Self>;
}

impl DomainRecord for HealthRecord {
    const DOMAIN: Domain = Domain::Health;

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Health(r) => Some(r),
            _ => None,
        }
    }
}

impl DomainRecord for SafetyRecord {
    const DOMAIN: Domain = Domain::Safety;

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Safety(r) => Some(r),
            _ => None,
        }
    }
}

impl DomainRecord for ReminderRecord {
    const DOMAIN: Domain = Domain::Reminder;

    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Reminder(r) => Some(r),
            _ => None,
        }
    }
}

// ── Field vocabularies ──────────────────────────────────────────────

/// Parse a "Yes"/"No" column. Anything other than yes counts as no.
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("yes")
}

/// Render a flag the way the store holds it.
pub fn flag_text(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

/// Movement activity reported by the wearable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Walking,
    Sitting,
    Lying,
    /// No movement at all ("No Movement" in the device feed).
    None,
    Other(String),
}

impl Movement {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.as_str() {
            "walking" => Movement::Walking,
            "sitting" => Movement::Sitting,
            "lying" => Movement::Lying,
            "none" | "no movement" | "" => Movement::None,
            _ => Movement::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Movement::Walking => f.write_str("Walking"),
            Movement::Sitting => f.write_str("Sitting"),
            Movement::Lying => f.write_str("Lying"),
            Movement::None => f.write_str("No Movement"),
            Movement::Other(s) => f.write_str(s),
        }
    }
}

/// Impact force of a detected fall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    None,
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => ImpactLevel::Low,
            "medium" => ImpactLevel::Medium,
            "high" => ImpactLevel::High,
            _ => ImpactLevel::None,
        }
    }

    pub fn is_significant(self) -> bool {
        matches!(self, ImpactLevel::Medium | ImpactLevel::High)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImpactLevel::None => "-",
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
