//! In-memory store, used by tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::{CommunicationEntry, CommunicationLog, RecordStore};
use crate::error::DatabaseError;
use crate::pipeline::types::{Domain, Record};

/// Keeps records and log entries in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Domain, Vec<Record>>>,
    persisted: RwLock<Vec<Record>>,
    log: RwLock<Vec<CommunicationEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records; each goes to its own domain.
    pub async fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut by_domain = store.records.write().await;
            for record in records {
                by_domain.entry(record.domain()).or_default().push(record);
            }
        }
        store
    }

    /// Every evaluated record persisted so far, in order.
    pub async fn persisted(&self) -> Vec<Record> {
        self.persisted.read().await.clone()
    }

    /// Every log entry, in append order.
    pub async fn entries(&self) -> Vec<CommunicationEntry> {
        self.log.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, domain: Domain) -> Result<Vec<Record>, DatabaseError> {
        Ok(self
            .records
            .read()
            .await
            .get(&domain)
            .cloned()
            .unwrap_or_default())
    }

    async fn persist(&self, record: &Record) -> Result<(), DatabaseError> {
        self.persisted.write().await.push(record.clone());
        Ok(())
    }

    async fn count_persisted(&self, domain: Domain) -> Result<usize, DatabaseError> {
        Ok(self
            .persisted
            .read()
            .await
            .iter()
            .filter(|r| r.domain() == domain)
            .count())
    }
}

#[async_trait]
impl CommunicationLog for MemoryStore {
    async fn append(&self, entry: &CommunicationEntry) -> Result<(), DatabaseError> {
        self.log.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CommunicationEntry>, DatabaseError> {
        let log = self.log.read().await;
        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    async fn count_by_sender(&self) -> Result<HashMap<String, usize>, DatabaseError> {
        let mut counts = HashMap::new();
        for entry in self.log.read().await.iter() {
            *counts.entry(entry.sender.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
