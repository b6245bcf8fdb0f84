//! Lazily-populated mapping from database to its permit broker.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::broker::PermitBroker;
use crate::config::AdmissionConfig;

/// Stable identifier of a backend database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(i64);

impl DatabaseId {
    /// The raw integer id.
    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for DatabaseId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db:{}", self.0)
    }
}

struct RegistryInner {
    brokers: DashMap<DatabaseId, PermitBroker>,
    config: AdmissionConfig,
}

/// Registry of one [`PermitBroker`] per database.
///
/// Insertion-only for the registry's lifetime: brokers are created on first
/// use and never removed, so at most one broker per database id is ever
/// visible. Cloneable; prefer injecting a registry instance over any global,
/// so that tests can construct isolated registries freely.
#[derive(Clone)]
pub struct BrokerRegistry {
    inner: Arc<RegistryInner>,
}

impl BrokerRegistry {
    /// Creates an empty registry.
    ///
    /// `max_simultaneous_queries_per_db` is read from `config` each time a
    /// new broker is created; existing brokers keep the capacity they were
    /// born with.
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                brokers: DashMap::new(),
                config,
            }),
        }
    }

    /// Returns the broker for `database`, creating it if absent.
    ///
    /// The entry API makes the insert-if-absent atomic: concurrent callers
    /// racing on a fresh database id all receive the single broker that won
    /// the slot, and exactly one broker is ever constructed.
    pub fn broker_for(&self, database: DatabaseId) -> PermitBroker {
        match self.inner.brokers.entry(database) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let capacity = self.inner.config.max_simultaneous_queries_per_db;
                debug!(%database, capacity, "creating permit broker");
                let broker = PermitBroker::new(capacity);
                entry.insert(broker.clone());
                broker
            }
        }
    }

    /// The configuration new brokers are created from.
    pub fn config(&self) -> &AdmissionConfig {
        &self.inner.config
    }

    /// Number of databases with a broker.
    pub fn len(&self) -> usize {
        self.inner.brokers.len()
    }

    /// Whether any broker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.inner.brokers.is_empty()
    }

    /// Closes every registered broker.
    ///
    /// Pending acquires fail with `BrokerClosed`; in-flight permits remain
    /// valid for their holders.
    pub fn close_all(&self) {
        for entry in self.inner.brokers.iter() {
            entry.value().close();
        }
    }
}

impl fmt::Debug for BrokerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("databases", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
