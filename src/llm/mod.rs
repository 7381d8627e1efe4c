//! Inference integration.
//!
//! Escalations are answered by a local model run as an external process
//! (`ollama run <model> <prompt>` by default). The [`InferenceGateway`]
//! trait is the seam: the dispatcher only ever sees an [`InferenceOutcome`],
//! which always renders to a response string, so a failed call still leaves
//! a visible entry in the communication log.

pub mod gateway;
mod ollama;
pub mod severity;

pub use gateway::{InferenceGateway, InferenceOutcome, TIMEOUT_FALLBACK, build_prompt};
pub use ollama::OllamaGateway;
pub use severity::Severity;
