//! Admission configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_max_simultaneous_queries_per_db() -> usize {
    15
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(1)
}

/// Configuration for query admission and response streaming.
///
/// Deserializable from the server's config file; all fields have defaults.
/// The per-database limit is read once when a database's broker is first
/// created; changing it later does not resize brokers that already exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdmissionConfig {
    /// Maximum number of queries that may execute concurrently against a
    /// single database.
    pub max_simultaneous_queries_per_db: usize,
    /// Interval between keep-alive heartbeats on streaming responses.
    #[serde(with = "humantime_serde")]
    pub keepalive_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_queries_per_db: default_max_simultaneous_queries_per_db(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

impl AdmissionConfig {
    /// Create a new builder for AdmissionConfig.
    pub fn builder() -> AdmissionConfigBuilder {
        AdmissionConfigBuilder::default()
    }
}

/// Builder for [`AdmissionConfig`].
#[derive(Debug, Clone, Default)]
pub struct AdmissionConfigBuilder {
    max_simultaneous_queries_per_db: Option<usize>,
    keepalive_interval: Option<Duration>,
}

impl AdmissionConfigBuilder {
    /// Set the per-database concurrent query limit.
    pub fn max_simultaneous_queries_per_db(self, limit: usize) -> Self {
        Self {
            max_simultaneous_queries_per_db: Some(limit),
            ..self
        }
    }

    /// Set the keep-alive heartbeat interval.
    pub fn keepalive_interval(self, interval: Duration) -> Self {
        Self {
            keepalive_interval: Some(interval),
            ..self
        }
    }

    /// Build the AdmissionConfig.
    pub fn build(self) -> AdmissionConfig {
        let defaults = AdmissionConfig::default();
        AdmissionConfig {
            max_simultaneous_queries_per_db: self
                .max_simultaneous_queries_per_db
                .unwrap_or(defaults.max_simultaneous_queries_per_db),
            keepalive_interval: self
                .keepalive_interval
                .unwrap_or(defaults.keepalive_interval),
        }
    }
}
