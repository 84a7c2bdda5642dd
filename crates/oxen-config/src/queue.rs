//! `QueueConfig`/`ProcessorConfig`: the typed view over the config JSON that
//! `oxen-runtime` actually builds a `Controller` from.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

fn default_db_table() -> String {
    "oxen_queue".to_string()
}
fn default_fastest_ms() -> u64 {
    100
}
fn default_slowest_ms() -> u64 {
    10_000
}
fn default_backoff_rate() -> f64 {
    1.1
}
fn default_concurrency() -> usize {
    3
}
fn default_timeout_s() -> u64 {
    60
}
fn default_recover_stuck() -> bool {
    true
}
fn default_recovery_threshold_s() -> u64 {
    // Must exceed default_timeout_s(); spec.md's "one minute" default for
    // each, read literally, is self-contradictory once recover_stuck_jobs
    // is on, so the threshold default is widened to keep out-of-the-box
    // configuration valid without any override.
    120
}

/// Store-wide settings: table name, extra projected fields, and the
/// Adaptive Poller's rate bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_db_table")]
    pub db_table: String,

    #[serde(default)]
    pub extra_fields: Vec<String>,

    #[serde(default = "default_fastest_ms")]
    pub fastest_polling_rate_ms: u64,

    #[serde(default = "default_slowest_ms")]
    pub slowest_polling_rate_ms: u64,

    #[serde(default = "default_backoff_rate")]
    pub polling_backoff_rate: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            db_table: default_db_table(),
            extra_fields: Vec::new(),
            fastest_polling_rate_ms: default_fastest_ms(),
            slowest_polling_rate_ms: default_slowest_ms(),
            polling_backoff_rate: default_backoff_rate(),
        }
    }
}

impl QueueConfig {
    pub fn fastest_polling_rate(&self) -> Duration {
        Duration::from_millis(self.fastest_polling_rate_ms)
    }

    pub fn slowest_polling_rate(&self) -> Duration {
        Duration::from_millis(self.slowest_polling_rate_ms)
    }

    /// Parse from the `/queue` subtree of a loaded config. Absent subtree
    /// yields all defaults.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        match config_json.pointer("/queue") {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fastest_polling_rate_ms == 0 {
            bail!("ConfigurationError: queue.fastest_polling_rate_ms must be > 0");
        }
        if self.slowest_polling_rate_ms < self.fastest_polling_rate_ms {
            bail!(
                "ConfigurationError: queue.slowest_polling_rate_ms ({}) must be >= fastest_polling_rate_ms ({})",
                self.slowest_polling_rate_ms,
                self.fastest_polling_rate_ms,
            );
        }
        if self.polling_backoff_rate <= 1.0 {
            bail!("ConfigurationError: queue.polling_backoff_rate must be > 1.0");
        }
        Ok(())
    }
}

/// Per-job-type processing settings: concurrency, timeout, stuck-job
/// recovery threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub job_type: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_timeout_s")]
    pub timeout_seconds: u64,

    #[serde(default = "default_recover_stuck")]
    pub recover_stuck_jobs: bool,

    #[serde(default = "default_recovery_threshold_s")]
    pub recovery_threshold_seconds: u64,
}

impl ProcessorConfig {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            concurrency: default_concurrency(),
            timeout_seconds: default_timeout_s(),
            recover_stuck_jobs: default_recover_stuck(),
            recovery_threshold_seconds: default_recovery_threshold_s(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn recovery_threshold(&self) -> Duration {
        Duration::from_secs(self.recovery_threshold_seconds)
    }

    /// Parse one entry of the `/processors` array matching `job_type`.
    pub fn from_config_json(config_json: &Value, job_type: &str) -> Result<Self> {
        let Some(entries) = config_json.pointer("/processors").and_then(Value::as_array) else {
            bail!("ConfigurationError: no /processors entries configured for job_type '{job_type}'");
        };
        let entry = entries
            .iter()
            .find(|e| e.pointer("/job_type").and_then(Value::as_str) == Some(job_type))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "ConfigurationError: no /processors entry for job_type '{job_type}'"
                )
            })?;
        Ok(serde_json::from_value(entry.clone())?)
    }

    /// Fatal-at-startup validation. `recover_stuck_jobs: false` exempts a
    /// processor from the threshold-vs-timeout check entirely.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!(
                "ConfigurationError: processors[{}].concurrency must be > 0",
                self.job_type
            );
        }
        if self.timeout_seconds == 0 {
            bail!(
                "ConfigurationError: processors[{}].timeout_seconds must be > 0",
                self.job_type
            );
        }
        if self.recover_stuck_jobs && self.recovery_threshold_seconds <= self.timeout_seconds {
            bail!(
                "ConfigurationError: processors[{}].recovery_threshold_seconds ({}) must exceed timeout_seconds ({})",
                self.job_type,
                self.recovery_threshold_seconds,
                self.timeout_seconds,
            );
        }
        Ok(())
    }
}

/// `max_connections` on the shared pool must cover every processor's
/// concurrency plus headroom for the Poller/Recoverer/CLI connections.
pub fn validate_pool_capacity(max_connections: u32, processors: &[ProcessorConfig]) -> Result<()> {
    let needed: usize = processors.iter().map(|p| p.concurrency).sum::<usize>() + 2;
    if (max_connections as usize) < needed {
        bail!(
            "ConfigurationError: db max_connections ({max_connections}) is below the minimum required ({needed}) for the configured processor concurrency"
        );
    }
    Ok(())
}

/// Resolve the pool's `max_connections`: an explicit `/db/max_connections`
/// override if the operator configured one, otherwise auto-derived as
/// `sum(processor concurrency) + 2`. Either way the result is run through
/// [`validate_pool_capacity`] — an explicit override too small for the
/// configured processors is a fatal configuration error rather than a pool
/// that silently starves Store calls under load.
pub fn resolve_max_connections(config_json: &Value, processors: &[ProcessorConfig]) -> Result<u32> {
    let auto_derived: u32 = processors.iter().map(|p| p.concurrency as u32).sum::<u32>() + 2;
    let max_connections = config_json
        .pointer("/db/max_connections")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(auto_derived);
    validate_pool_capacity(max_connections, processors)?;
    Ok(max_connections)
}
