//! Eldercare dispatch: alert evaluation and escalation pipeline.

pub mod config;
pub mod error;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod worker;
