//! Process-backed inference gateway.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::gateway::{InferenceGateway, InferenceOutcome, build_prompt};
use crate::config::InferenceConfig;
use crate::pipeline::types::Sender;

/// Runs `<program> <base_args..> <model> <prompt>` once per call.
///
/// Output is decoded lossily, so invalid UTF-8 never fails a call. On
/// timeout the child is killed when its future is dropped.
#[derive(Debug, Clone)]
pub struct OllamaGateway {
    config: InferenceConfig,
}

impl OllamaGateway {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    fn command(&self, prompt: &str) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.base_args)
            .arg(&self.config.model)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl InferenceGateway for OllamaGateway {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn infer(&self, sender: Sender, subject: &str, message: &str) -> InferenceOutcome {
        let prompt = build_prompt(sender, message);
        let start = Instant::now();

        let child = match self.command(&prompt).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    program = %self.config.program,
                    user_id = %subject,
                    "Failed to start inference process: {e}"
                );
                return InferenceOutcome::Error(format!(
                    "failed to run '{}': {e}",
                    self.config.program
                ));
            }
        };

        let waited = tokio::time::timeout(self.config.timeout, child.wait_with_output()).await;
        let outcome = match waited {
            Ok(Ok(output)) if output.status.success() => InferenceOutcome::Completed(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ),
            Ok(Ok(output)) => InferenceOutcome::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            Ok(Err(e)) => InferenceOutcome::Error(e.to_string()),
            Err(_) => InferenceOutcome::TimedOut {
                after: self.config.timeout,
            },
        };

        debug!(
            sender = %sender,
            user_id = %subject,
            model = %self.config.model,
            outcome = outcome.label(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inference call finished"
        );
        outcome
    }
}
