//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    /// Number of parallel reconcile workers
    pub workers: usize,
    /// Bind address of the probe and metrics server
    pub probe_addr: SocketAddr,
    /// First retry delay for a failing key
    pub base_delay: Duration,
    /// Upper bound on the retry delay
    pub max_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 2,
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let workers = parse_or(&lookup, "WORKER_COUNT", defaults.workers)?;
        if workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "WORKER_COUNT must be at least 1".to_string(),
            ));
        }

        let probe_addr = parse_or(&lookup, "PROBE_ADDR", defaults.probe_addr)?;
        let base_delay = lookup("QUEUE_BASE_DELAY_MS")
            .map(|v| parse("QUEUE_BASE_DELAY_MS", &v).map(Duration::from_millis))
            .transpose()?
            .unwrap_or(defaults.base_delay);
        let max_delay = lookup("QUEUE_MAX_DELAY_SECS")
            .map(|v| parse("QUEUE_MAX_DELAY_SECS", &v).map(Duration::from_secs))
            .transpose()?
            .unwrap_or(defaults.max_delay);
        if base_delay.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "QUEUE_BASE_DELAY_MS must be at least 1".to_string(),
            ));
        }
        if base_delay > max_delay {
            return Err(ControllerError::InvalidConfig(format!(
                "QUEUE_BASE_DELAY_MS ({}ms) exceeds QUEUE_MAX_DELAY_SECS ({}s)",
                base_delay.as_millis(),
                max_delay.as_secs()
            )));
        }

        Ok(Self {
            namespace,
            workers,
            probe_addr,
            base_delay,
            max_delay,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{key}={value:?}: {e}")))
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}
