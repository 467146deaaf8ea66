//! Configuration for the Directory Reconciler.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::domain::error::Operation;

/// Environment variable prefix; nested keys are separated by `__`, e.g.
/// `DIRECTORY_RECONCILER__TIMEOUTS__CREATE=10m`.
pub const ENV_PREFIX: &str = "DIRECTORY_RECONCILER__";

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReconcilerConfig {
    /// Tenant the directory clients are bound to. Used to build data source IDs.
    pub tenant_id: String,

    /// Enables the duplicate display-name guard for every resource that
    /// supports it, regardless of the per-resource setting.
    pub prevent_duplicate_names: bool,

    /// Per-operation deadlines.
    pub timeouts: OperationTimeouts,

    /// Delay between reads while waiting for an eventually consistent change
    /// to become visible.
    #[serde(with = "crate::humantime_serde")]
    pub consistency_poll_interval: Duration,

    pub logging: LoggingConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            prevent_duplicate_names: false,
            timeouts: OperationTimeouts::default(),
            consistency_poll_interval: Duration::from_secs(1),
            logging: LoggingConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Loads configuration from defaults, then the optional YAML file, then
    /// `DIRECTORY_RECONCILER__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, a source cannot be parsed,
    /// or the merged configuration is invalid.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                bail!("configuration file not found: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load directory reconciler configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Checks values that deserialize fine but cannot work at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("timeouts.create", self.timeouts.create),
            ("timeouts.read", self.timeouts.read),
            ("timeouts.update", self.timeouts.update),
            ("timeouts.delete", self.timeouts.delete),
            ("consistency_poll_interval", self.consistency_poll_interval),
        ] {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }
}

/// Deadline applied to each lifecycle operation, covering every remote call
/// and lock wait it makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OperationTimeouts {
    #[serde(with = "crate::humantime_serde")]
    pub create: Duration,
    #[serde(with = "crate::humantime_serde")]
    pub read: Duration,
    #[serde(with = "crate::humantime_serde")]
    pub update: Duration,
    #[serde(with = "crate::humantime_serde")]
    pub delete: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_OPERATION_TIMEOUT)
    }
}

impl OperationTimeouts {
    /// Same timeout for every operation.
    #[must_use]
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    /// Timeout for `operation`. Import and load are bounded like reads.
    #[must_use]
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read | Operation::Import | Operation::Load | Operation::Persist => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}
