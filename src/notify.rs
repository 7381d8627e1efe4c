//! Local spoken notification for fall alerts.
//!
//! Best effort: failures are reported as a [`NotifyOutcome`] and logged,
//! never propagated.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

/// How a notification attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// Notifications are switched off in configuration.
    Disabled,
    Failed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce `message` locally. Callers may ignore the outcome.
    async fn notify(&self, message: &str) -> NotifyOutcome;
}

/// Speaks the message through a text-to-speech command (`say` by default).
#[derive(Debug, Clone)]
pub struct SpeechNotifier {
    config: NotifyConfig,
}

impl SpeechNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Notifier for SpeechNotifier {
    async fn notify(&self, message: &str) -> NotifyOutcome {
        if !self.config.enabled {
            return NotifyOutcome::Disabled;
        }

        let child = Command::new(&self.config.program)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let outcome = match child {
            Err(e) => {
                NotifyOutcome::Failed(format!("failed to run '{}': {e}", self.config.program))
            }
            Ok(child) => {
                let waited =
                    tokio::time::timeout(self.config.timeout, child.wait_with_output()).await;
                match waited {
                    Ok(Ok(output)) if output.status.success() => NotifyOutcome::Delivered,
                    Ok(Ok(output)) => NotifyOutcome::Failed(format!(
                        "exit {}: {}",
                        output.status.code().unwrap_or(-1),
                        String::from_utf8_lossy(&output.stderr).trim()
                    )),
                    Ok(Err(e)) => NotifyOutcome::Failed(e.to_string()),
                    Err(_) => {
                        NotifyOutcome::Failed(format!("timed out after {:?}", self.config.timeout))
                    }
                }
            }
        };

        match &outcome {
            NotifyOutcome::Failed(reason) => {
                warn!(program = %self.config.program, "Local notification failed: {reason}")
            }
            _ => debug!(program = %self.config.program, "Local notification delivered"),
        }
        outcome
    }
}
