//! Persistence seams used by the pipeline.
//!
//! The record store supplies batches and accepts evaluated records; the
//! communication log is a write-mostly sink with one row per completed
//! dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::DatabaseError;
use crate::pipeline::types::{Domain, Record};

/// Timestamp format used in the communication log.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the communication log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationEntry {
    /// Evaluator identity, e.g. "SafetyAgent".
    pub sender: String,
    /// Monitored user the escalation concerns.
    pub subject: String,
    pub message: String,
    pub response: String,
    /// Local wall-clock completion time.
    pub timestamp: NaiveDateTime,
}

/// Source of domain records and sink for evaluated ones.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of a domain, in stored order.
    async fn fetch(&self, domain: Domain) -> Result<Vec<Record>, DatabaseError>;

    /// Append an evaluated record. Called once per evaluated record.
    async fn persist(&self, record: &Record) -> Result<(), DatabaseError>;

    /// Number of evaluated records persisted for a domain.
    async fn count_persisted(&self, domain: Domain) -> Result<usize, DatabaseError>;
}

/// Append-only log of escalations and the responses they received.
#[async_trait]
pub trait CommunicationLog: Send + Sync {
    async fn append(&self, entry: &CommunicationEntry) -> Result<(), DatabaseError>;

    /// Logged entries, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<CommunicationEntry>, DatabaseError>;

    /// Number of logged entries per sender.
    async fn count_by_sender(&self) -> Result<HashMap<String, usize>, DatabaseError>;
}
