//! Configuration types.
//!
//! Everything is read from the environment with sensible defaults; the
//! `Default` impls carry the same values so tests can build configs directly.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::types::Domain;

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Directory for rolling log files (stderr only when `None`).
    pub log_dir: Option<PathBuf>,
    pub dispatch: DispatchConfig,
    pub inference: InferenceConfig,
    pub notify: NotifyConfig,
    pub budgets: AlertBudgets,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/elderly_care.db"),
            log_dir: None,
            dispatch: DispatchConfig::default(),
            inference: InferenceConfig::default(),
            notify: NotifyConfig::default(),
            budgets: AlertBudgets::default(),
        }
    }
}

impl PipelineConfig {
    /// Build the configuration from `CARE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("CARE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let log_dir = std::env::var("CARE_LOG_DIR").ok().map(PathBuf::from);

        let dispatch = DispatchConfig {
            pool_width: env_parse("CARE_POOL_WIDTH", defaults.dispatch.pool_width)?,
            poll_interval: Duration::from_millis(env_parse(
                "CARE_POLL_INTERVAL_MS",
                defaults.dispatch.poll_interval.as_millis() as u64,
            )?),
            drain_timeout: env_parse_opt::<u64>("CARE_DRAIN_TIMEOUT_SECS")?
                .map(Duration::from_secs),
        };
        if dispatch.pool_width == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CARE_POOL_WIDTH".into(),
                message: "pool width must be at least 1".into(),
            });
        }

        let model =
            std::env::var("CARE_LLM_MODEL").unwrap_or_else(|_| defaults.inference.model.clone());
        if model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "CARE_LLM_MODEL".into(),
                hint: "Set it to a model the inference program has pulled, e.g. tinyllama".into(),
            });
        }

        let inference = InferenceConfig {
            program: std::env::var("CARE_LLM_PROGRAM").unwrap_or(defaults.inference.program),
            base_args: defaults.inference.base_args,
            model,
            timeout: Duration::from_secs(env_parse(
                "CARE_LLM_TIMEOUT_SECS",
                defaults.inference.timeout.as_secs(),
            )?),
        };

        let notify = NotifyConfig {
            enabled: env_parse("CARE_NOTIFY_ENABLED", defaults.notify.enabled)?,
            program: std::env::var("CARE_NOTIFY_PROGRAM").unwrap_or(defaults.notify.program),
            timeout: defaults.notify.timeout,
        };

        let budgets = AlertBudgets {
            health: env_parse("CARE_BUDGET_HEALTH", defaults.budgets.health)?,
            safety: env_parse("CARE_BUDGET_SAFETY", defaults.budgets.safety)?,
            reminder: env_parse("CARE_BUDGET_REMINDER", defaults.budgets.reminder)?,
        };

        Ok(Self {
            db_path,
            log_dir,
            dispatch,
            inference,
            notify,
            budgets,
        })
    }
}

/// Dispatch worker pool configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of inference calls in flight at once.
    pub pool_width: usize,
    /// How long one queue poll waits before re-checking for shutdown.
    pub poll_interval: Duration,
    /// Upper bound on waiting for quiescence at shutdown (`None` waits forever).
    pub drain_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_width: 14,
            poll_interval: Duration::from_secs(1),
            drain_timeout: None,
        }
    }
}

/// External inference process configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Executable to invoke.
    pub program: String,
    /// Arguments placed before the model identifier.
    pub base_args: Vec<String>,
    /// Model identifier passed to the program.
    pub model: String,
    /// Wall-clock bound for one call.
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            program: "ollama".to_string(),
            base_args: vec!["run".to_string()],
            model: "tinyllama".to_string(),
            timeout: Duration::from_secs(300), // local models can be slow
        }
    }
}

/// Local speech notification configuration.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Text-to-speech command; the message is passed as its only argument.
    pub program: String,
    pub timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "say".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Per-run alert caps, one per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertBudgets {
    pub health: usize,
    pub safety: usize,
    pub reminder: usize,
}

impl AlertBudgets {
    /// Cap for a given domain.
    pub fn for_domain(&self, domain: Domain) -> usize {
        match domain {
            Domain::Health => self.health,
            Domain::Safety => self.safety,
            Domain::Reminder => self.reminder,
        }
    }
}

impl Default for AlertBudgets {
    fn default() -> Self {
        Self {
            health: 10,
            safety: 10,
            reminder: 30,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    Ok(env_parse_opt(key)?.unwrap_or(default))
}

fn env_parse_opt<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
