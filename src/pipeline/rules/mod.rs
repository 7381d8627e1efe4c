//! Per-domain rule engines.
//!
//! Each evaluator maps one record to an escalation decision. Rule cases are
//! ordered and mutually exclusive: the first case that matches wins. Budget
//! accounting, enqueueing and persistence live in the batch processor, so
//! evaluators stay pure and deterministic for a given record and `now`.

mod health;
mod reminder;
mod safety;

pub use health::HealthRules;
pub use reminder::{ESCALATION_GRACE_MINUTES, ReminderRules};
pub use safety::{FALL_INACTIVITY_SECS, SafetyRules, STILLNESS_SECS};

use chrono::NaiveDateTime;

use crate::error::RecordError;
use crate::pipeline::types::{DomainRecord, Escalation};

/// Decides, record by record, whether a situation needs escalation.
pub trait RuleEvaluator: Send + Sync {
    type Record: DomainRecord;

    /// Evaluate one record against the ordered rule cases.
    ///
    /// Returns `Ok(None)` when no case matches and `Err` when a field the
    /// rules depend on cannot be parsed.
    fn evaluate(
        &self,
        record: &Self::Record,
        now: NaiveDateTime,
    ) -> Result<Option<Escalation>, RecordError>;
}

/// Human wording for a threshold flag.
pub(crate) fn normality(out_of_range: bool) -> &'static str {
    if out_of_range { "not normal" } else { "normal" }
}
