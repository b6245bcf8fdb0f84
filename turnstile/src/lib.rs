#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Admission entry point.
///
/// [`Admission::submit`](admission::Admission::submit) couples a worker
/// invocation to a broker permit and a [`ResultHandle`](handle::ResultHandle),
/// wiring cancellation between them.
pub mod admission;

/// Per-database permit broker with abandoned-permit recovery.
///
/// [`PermitBroker`](broker::PermitBroker) bounds concurrent query execution
/// against one database and reclaims permits whose holders vanished without
/// releasing them.
pub mod broker;

/// Admission configuration types.
pub mod config;

/// Error types for admission operations.
pub mod error;

/// Single-shot, closeable result channel.
///
/// Closing a [`ResultHandle`](handle::ResultHandle) before its value arrives
/// is the cancellation signal for the associated worker.
pub mod handle;

/// Admission permits.
pub mod permit;

/// Registry mapping database ids to their brokers.
pub mod registry;

pub use admission::Admission;
pub use broker::PermitBroker;
pub use config::{AdmissionConfig, AdmissionConfigBuilder};
pub use error::{BrokerClosed, HandleClosed, WorkerError};
pub use handle::{QueryResult, ResultHandle};
pub use permit::{Permit, PermitId};
pub use registry::{BrokerRegistry, DatabaseId};

pub use tokio_util::sync::CancellationToken;
