//! Persistence layer: record store and communication log.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{CommunicationEntry, CommunicationLog, LOG_TIMESTAMP_FORMAT, RecordStore};
