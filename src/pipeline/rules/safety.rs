//! Fall and movement rules.

use chrono::NaiveDateTime;
use tracing::debug;

use super::RuleEvaluator;
use crate::error::RecordError;
use crate::pipeline::types::{Escalation, Movement, Priority, SafetyRecord};

/// Post-fall inactivity (seconds) above which a significant fall escalates.
pub const FALL_INACTIVITY_SECS: u64 = 30;

/// Inactivity (seconds) above which a motionless user escalates.
pub const STILLNESS_SECS: u64 = 1800;

/// Locations where lying down is treated as a likely incident.
const HIGH_RISK_LOCATIONS: &[&str] = &["bathroom", "kitchen"];

/// Ordered safety cases, first match wins:
///
/// 1. fall with medium/high impact and more than 30 s of inactivity
/// 2. lying in the bathroom or kitchen
/// 3. no movement for more than 30 minutes
/// 4. fall followed by no movement
///
/// Records whose alert has already been triggered never escalate again.
/// Fall cases also request a local spoken notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyRules;

impl RuleEvaluator for SafetyRules {
    type Record = SafetyRecord;

    fn evaluate(
        &self,
        record: &SafetyRecord,
        _now: NaiveDateTime,
    ) -> Result<Option<Escalation>, RecordError> {
        let inactivity = inactivity_secs(record)?;

        if record.alert_triggered {
            debug!(user_id = %record.user_id, "Alert already triggered, skipping");
            return Ok(None);
        }

        let user = &record.user_id;
        let location = &record.location;

        if record.fall_detected
            && record.impact.is_significant()
            && inactivity > FALL_INACTIVITY_SECS
        {
            let message = format!(
                "Fall detected for user {user} in the {location} with {impact} impact force. \
                 No movement for {inactivity} seconds after the fall. \
                 What immediate action should be taken?",
                impact = record.impact,
            );
            return Ok(Some(
                Escalation::new("fall_with_inactivity", Priority::Critical, message)
                    .with_local_notification(),
            ));
        }

        if record.movement == Movement::Lying && is_high_risk(location) {
            let message = format!(
                "User {user} is lying down in the {location}, a high-risk area. \
                 What action should be taken?"
            );
            return Ok(Some(Escalation::new(
                "lying_in_high_risk_area",
                Priority::Urgent,
                message,
            )));
        }

        if record.movement == Movement::None && inactivity > STILLNESS_SECS {
            let message = format!(
                "User {user} has shown no movement for {inactivity} seconds in the {location}. \
                 What action should be taken?"
            );
            return Ok(Some(Escalation::new(
                "prolonged_inactivity",
                Priority::Urgent,
                message,
            )));
        }

        if record.fall_detected && record.movement == Movement::None {
            let message = format!(
                "Fall detected for user {user} in the {location} and no movement since. \
                 What immediate action should be taken?"
            );
            return Ok(Some(
                Escalation::new("fall_without_movement", Priority::Critical, message)
                    .with_local_notification(),
            ));
        }

        Ok(None)
    }
}

fn is_high_risk(location: &str) -> bool {
    let location = location.trim();
    HIGH_RISK_LOCATIONS
        .iter()
        .any(|l| location.eq_ignore_ascii_case(l))
}

/// Parse the recorded inactivity. Blank or "-" means none was measured.
fn inactivity_secs(record: &SafetyRecord) -> Result<u64, RecordError> {
    let raw = record.inactivity.trim();
    if raw.is_empty() || raw == "-" {
        return Ok(0);
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs as u64),
        _ => Err(RecordError::InvalidDuration {
            user_id: record.user_id.clone(),
            raw: raw.to_string(),
        }),
    }
}
