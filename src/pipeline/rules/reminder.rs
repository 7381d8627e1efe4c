//! Reminder rules.

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};

use super::RuleEvaluator;
use crate::error::RecordError;
use crate::pipeline::types::{Escalation, Priority, ReminderRecord};

/// Minutes a sent reminder may stay unacknowledged before escalating.
pub const ESCALATION_GRACE_MINUTES: i64 = 5;

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

/// Two cases, checked in order:
///
/// - **due now**: the scheduled time has arrived and nothing was sent yet
/// - **escalate**: sent, still unacknowledged more than five minutes later
///
/// The scheduled time is a time of day, combined with the date of `now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReminderRules;

impl RuleEvaluator for ReminderRules {
    type Record = ReminderRecord;

    fn evaluate(
        &self,
        record: &ReminderRecord,
        now: NaiveDateTime,
    ) -> Result<Option<Escalation>, RecordError> {
        let time = parse_time_of_day(&record.scheduled_time).ok_or_else(|| {
            RecordError::InvalidTime {
                user_id: record.user_id.clone(),
                raw: record.scheduled_time.clone(),
            }
        })?;
        let scheduled = now.date().and_time(time);

        let user = &record.user_id;
        let kind = &record.reminder_type;
        let at = &record.scheduled_time;

        if !record.sent && now >= scheduled {
            let message = format!(
                "Reminder for user {user}: {kind} scheduled at {at} is due now and has not been sent. \
                 Suggest a short, friendly reminder to say to them."
            );
            return Ok(Some(Escalation::new("due_now", Priority::Routine, message)));
        }

        let overdue_for = now - scheduled;
        if record.sent
            && !record.acknowledged
            && overdue_for > TimeDelta::minutes(ESCALATION_GRACE_MINUTES)
        {
            let overdue = overdue_for.num_minutes();
            let message = format!(
                "User {user} has not acknowledged the {kind} reminder sent for {at}, \
                 {overdue} minutes ago. Recommend a follow-up action for the caregiver."
            );
            return Ok(Some(Escalation::new(
                "unacknowledged",
                Priority::Urgent,
                message,
            )));
        }

        Ok(None)
    }
}

fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 22)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record(time: &str, sent: bool, acknowledged: bool) -> ReminderRecord {
        ReminderRecord {
            user_id: "D1002".into(),
            timestamp: "2025-01-22 07:00:00".into(),
            reminder_type: "Medication".into(),
            scheduled_time: time.into(),
            sent,
            acknowledged,
        }
    }

    #[test]
    fn unsent_reminder_due_now() {
        let escalation = ReminderRules
            .evaluate(&record("08:00:00", false, false), at(8, 0))
            .unwrap()
            .unwrap();
        assert_eq!(escalation.rule, "due_now");
        assert_eq!(escalation.priority, Priority::Routine);
        assert!(escalation.message.contains("Medication"));
        assert!(escalation.message.contains("is due now"));
    }

    #[test]
    fn unsent_reminder_in_the_future_waits() {
        let result = ReminderRules
            .evaluate(&record("08:00:00", false, false), at(7, 59))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn unacknowledged_past_grace_escalates_with_distinct_text() {
        let escalation = ReminderRules
            .evaluate(&record("08:00", true, false), at(8, 6))
            .unwrap()
            .unwrap();
        assert_eq!(escalation.rule, "unacknowledged");
        assert_eq!(escalation.priority, Priority::Urgent);
        assert!(escalation.message.contains("has not acknowledged"));
        assert!(!escalation.message.contains("is due now"));
    }

    #[test]
    fn unacknowledged_within_grace_waits() {
        let result = ReminderRules
            .evaluate(&record("08:00", true, false), at(8, 5))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn acknowledged_reminder_is_quiet() {
        let result = ReminderRules
            .evaluate(&record("08:00", true, true), at(12, 0))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn twelve_hour_clock_is_accepted() {
        let result = ReminderRules
            .evaluate(&record("8:00 PM", false, false), at(20, 1))
            .unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn malformed_time_is_a_record_error() {
        let err = ReminderRules
            .evaluate(&record("after lunch", false, false), at(13, 0))
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidTime {
                user_id: "D1002".into(),
                raw: "after lunch".into(),
            }
        );
    }
}
