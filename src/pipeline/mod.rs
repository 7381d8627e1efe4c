//! Alert evaluation pipeline.
//!
//! Records flow through:
//! 1. `RecordStore::fetch()`: one ordered batch per domain
//! 2. `RuleEvaluator::evaluate()`: ordered rule cases, first match wins
//! 3. `BatchProcessor`: per-run alert budget, enqueue, local notification
//!    and persistence of every evaluated record
//!
//! Dispatch of enqueued escalations happens asynchronously in `worker`.

pub mod budget;
pub mod processor;
pub mod rules;
pub mod types;

pub use budget::AlertBudget;
pub use processor::{BatchProcessor, BatchReport};
pub use rules::{HealthRules, ReminderRules, RuleEvaluator, SafetyRules};
pub use types::{Domain, Escalation, Priority, Record, Sender};
