//! libSQL backend for the record store and the communication log.
//!
//! Supports local file and in-memory databases. Record tables keep the
//! text encoding the device feeds use ("Yes"/"No" flags, free-form
//! activity and impact columns); conversion to typed records happens here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use libsql::{Connection, Database as LibSqlDatabase, Row, Value, params};
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::{
    Domain, HealthRecord, ImpactLevel, Movement, Record, ReminderRecord, SafetyRecord, flag_text,
    parse_flag,
};
use crate::store::migrations;
use crate::store::traits::{
    CommunicationEntry, CommunicationLog, LOG_TIMESTAMP_FORMAT, RecordStore,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and dry runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Insert a raw health row.
    pub async fn insert_health(&self, r: &HealthRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO health (user_id, timestamp, heart_rate, hear_rate_threshold_flag, bp, bp_threshold_flag, glucose, glucose_threshold_flag, oxygen, oxygen_threshold_flag, alert_triggered, caregiver_notified) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    r.user_id.clone(),
                    r.timestamp.clone(),
                    r.heart_rate,
                    flag_text(r.heart_rate_flag),
                    r.blood_pressure.clone(),
                    flag_text(r.blood_pressure_flag),
                    r.glucose,
                    flag_text(r.glucose_flag),
                    r.oxygen,
                    flag_text(r.oxygen_flag),
                    flag_text(r.alert_triggered),
                    flag_text(r.caregiver_notified),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to insert health record: {e}")))?;
        Ok(())
    }

    /// Insert a raw safety row.
    pub async fn insert_safety(&self, r: &SafetyRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO safety (user_id, timestamp, activity, fall_detected, impact_force_level, post_fall_inactivity_duration, location, alert_triggered, caregiver_notified) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    r.user_id.clone(),
                    r.timestamp.clone(),
                    r.movement.to_string(),
                    flag_text(r.fall_detected),
                    r.impact.as_str(),
                    r.inactivity.clone(),
                    r.location.clone(),
                    flag_text(r.alert_triggered),
                    flag_text(r.caregiver_notified),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to insert safety record: {e}")))?;
        Ok(())
    }

    /// Insert a raw reminder row.
    pub async fn insert_reminder(&self, r: &ReminderRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO reminders (user_id, timestamp, reminder_type, scheduled_time, sent, acknowledged) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    r.user_id.clone(),
                    r.timestamp.clone(),
                    r.reminder_type.clone(),
                    r.scheduled_time.clone(),
                    flag_text(r.sent),
                    flag_text(r.acknowledged),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to insert reminder record: {e}")))?;
        Ok(())
    }

    /// Insert any record into its domain table.
    pub async fn insert_record(&self, record: &Record) -> Result<(), DatabaseError> {
        match record {
            Record::Health(r) => self.insert_health(r).await,
            Record::Safety(r) => self.insert_safety(r).await,
            Record::Reminder(r) => self.insert_reminder(r).await,
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Read a column as text regardless of its storage class. NULL reads as "".
fn text(row: &Row, idx: i32) -> Result<String, DatabaseError> {
    let value = row
        .get_value(idx)
        .map_err(|e| DatabaseError::Serialization(format!("column {idx}: {e}")))?;
    Ok(match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    })
}

/// Read a numeric column. Integer text and whole reals are accepted.
fn integer(row: &Row, idx: i32) -> Result<i64, DatabaseError> {
    let value = row
        .get_value(idx)
        .map_err(|e| DatabaseError::Serialization(format!("column {idx}: {e}")))?;
    match value {
        Value::Integer(i) => Ok(i),
        Value::Real(f) if f.fract() == 0.0 => Ok(f as i64),
        Value::Text(s) => s.trim().parse().map_err(|_| {
            DatabaseError::Serialization(format!("column {idx}: not a number: '{s}'"))
        }),
        other => Err(DatabaseError::Serialization(format!(
            "column {idx}: not a number: {other:?}"
        ))),
    }
}

fn row_to_health(row: &Row) -> Result<Record, DatabaseError> {
    Ok(Record::Health(HealthRecord {
        user_id: text(row, 0)?,
        timestamp: text(row, 1)?,
        heart_rate: integer(row, 2)?,
        heart_rate_flag: parse_flag(&text(row, 3)?),
        blood_pressure: text(row, 4)?,
        blood_pressure_flag: parse_flag(&text(row, 5)?),
        glucose: integer(row, 6)?,
        glucose_flag: parse_flag(&text(row, 7)?),
        oxygen: integer(row, 8)?,
        oxygen_flag: parse_flag(&text(row, 9)?),
        alert_triggered: parse_flag(&text(row, 10)?),
        caregiver_notified: parse_flag(&text(row, 11)?),
    }))
}

fn row_to_safety(row: &Row) -> Result<Record, DatabaseError> {
    Ok(Record::Safety(SafetyRecord {
        user_id: text(row, 0)?,
        timestamp: text(row, 1)?,
        movement: Movement::parse(&text(row, 2)?),
        fall_detected: parse_flag(&text(row, 3)?),
        impact: ImpactLevel::parse(&text(row, 4)?),
        inactivity: text(row, 5)?,
        location: text(row, 6)?,
        alert_triggered: parse_flag(&text(row, 7)?),
        caregiver_notified: parse_flag(&text(row, 8)?),
    }))
}

fn row_to_reminder(row: &Row) -> Result<Record, DatabaseError> {
    Ok(Record::Reminder(ReminderRecord {
        user_id: text(row, 0)?,
        timestamp: text(row, 1)?,
        reminder_type: text(row, 2)?,
        scheduled_time: text(row, 3)?,
        sent: parse_flag(&text(row, 4)?),
        acknowledged: parse_flag(&text(row, 5)?),
    }))
}

fn parse_log_timestamp(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, LOG_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .unwrap_or_default()
}

// ── Trait implementations ───────────────────────────────────────────

const HEALTH_QUERY: &str = "SELECT user_id, timestamp, heart_rate, hear_rate_threshold_flag, bp, bp_threshold_flag, glucose, glucose_threshold_flag, oxygen, oxygen_threshold_flag, alert_triggered, caregiver_notified FROM health ORDER BY rowid";

const SAFETY_QUERY: &str = "SELECT user_id, timestamp, activity, fall_detected, impact_force_level, post_fall_inactivity_duration, location, alert_triggered, caregiver_notified FROM safety ORDER BY rowid";

const REMINDER_QUERY: &str = "SELECT user_id, timestamp, reminder_type, scheduled_time, sent, acknowledged FROM reminders ORDER BY rowid";

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn fetch(&self, domain: Domain) -> Result<Vec<Record>, DatabaseError> {
        let (sql, convert): (&str, fn(&Row) -> Result<Record, DatabaseError>) = match domain {
            Domain::Health => (HEALTH_QUERY, row_to_health),
            Domain::Safety => (SAFETY_QUERY, row_to_safety),
            Domain::Reminder => (REMINDER_QUERY, row_to_reminder),
        };

        let mut rows = self
            .conn
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to fetch {domain} records: {e}")))?;

        let mut records = Vec::new();
        let mut position = 0usize;
        while let Ok(Some(row)) = rows.next().await {
            match convert(&row) {
                Ok(record) => records.push(record),
                Err(e) => warn!(domain = %domain, row = position, "Skipping unreadable row: {e}"),
            }
            position += 1;
        }
        Ok(records)
    }

    async fn persist(&self, record: &Record) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(record)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let persisted_at = Local::now()
            .naive_local()
            .format(LOG_TIMESTAMP_FORMAT)
            .to_string();

        self.conn
            .execute(
                "INSERT INTO evaluated_records (domain, user_id, recorded_at, payload, persisted_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.domain().as_str(),
                    record.user_id().to_string(),
                    record.timestamp().to_string(),
                    payload,
                    persisted_at,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to persist record: {e}")))?;
        Ok(())
    }

    async fn count_persisted(&self, domain: Domain) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM evaluated_records WHERE domain = ?1",
                params![domain.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as usize)
                .map_err(|e| DatabaseError::Serialization(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(e.to_string())),
        }
    }
}

#[async_trait]
impl CommunicationLog for LibSqlBackend {
    async fn append(&self, entry: &CommunicationEntry) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO agent_communications (sender, user_id, message, response, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.sender.clone(),
                    entry.subject.clone(),
                    entry.message.clone(),
                    entry.response.clone(),
                    entry.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string(),
                ],
            )
            .await
            .map_err(|e| {
                DatabaseError::Query(format!("Failed to append communication entry: {e}"))
            })?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CommunicationEntry>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT sender, user_id, message, response, timestamp FROM agent_communications ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(CommunicationEntry {
                sender: text(&row, 0)?,
                subject: text(&row, 1)?,
                message: text(&row, 2)?,
                response: text(&row, 3)?,
                timestamp: parse_log_timestamp(&text(&row, 4)?),
            });
        }
        Ok(entries)
    }

    async fn count_by_sender(&self) -> Result<HashMap<String, usize>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT sender, COUNT(*) FROM agent_communications GROUP BY sender",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut counts = HashMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let sender = text(&row, 0)?;
            let count = integer(&row, 1)?;
            counts.insert(sender, count as usize);
        }
        Ok(counts)
    }
}
