//! Vital-sign rules.

use chrono::NaiveDateTime;
use tracing::debug;

use super::{RuleEvaluator, normality};
use crate::error::RecordError;
use crate::pipeline::types::{Escalation, HealthRecord, Priority};

/// Escalates when heart rate, blood pressure or glucose is flagged as
/// outside its threshold. Oxygen saturation is reported but never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthRules;

impl RuleEvaluator for HealthRules {
    type Record = HealthRecord;

    fn evaluate(
        &self,
        record: &HealthRecord,
        _now: NaiveDateTime,
    ) -> Result<Option<Escalation>, RecordError> {
        if !(record.heart_rate_flag || record.blood_pressure_flag || record.glucose_flag) {
            return Ok(None);
        }

        debug!(user_id = %record.user_id, "Vital sign outside threshold");
        Ok(Some(Escalation::new(
            "vitals_out_of_range",
            Priority::Urgent,
            vitals_message(record),
        )))
    }
}

fn vitals_message(r: &HealthRecord) -> String {
    format!(
        "Health alert for user {user} at {ts}.\n\
         Heart rate: {hr} bpm ({hr_state}).\n\
         Blood pressure: {bp} ({bp_state}).\n\
         Glucose: {glucose} mg/dL ({glucose_state}).\n\
         Oxygen saturation: {oxygen}% ({oxygen_state}).\n\
         In one line, what action should be taken?",
        user = r.user_id,
        ts = r.timestamp,
        hr = r.heart_rate,
        hr_state = normality(r.heart_rate_flag),
        bp = r.blood_pressure,
        bp_state = normality(r.blood_pressure_flag),
        glucose = r.glucose,
        glucose_state = normality(r.glucose_flag),
        oxygen = r.oxygen,
        oxygen_state = normality(r.oxygen_flag),
    )
}
