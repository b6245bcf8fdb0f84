//! Error types for admission operations.

use thiserror::Error;

/// Error returned by acquire on a broker that has been closed.
///
/// No permit is consumed; the caller decides whether to resubmit elsewhere.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("permit broker is closed")]
pub struct BrokerClosed;

/// Error returned by [`ResultHandle::recv`](crate::handle::ResultHandle::recv)
/// when the handle was closed (or its value already consumed) before a value
/// could be observed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("result handle closed before a value was delivered")]
pub struct HandleClosed;

/// Failure published into a [`ResultHandle`](crate::handle::ResultHandle)
/// in place of a successful payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker returned an error or panicked.
    #[error("{message}")]
    Fault {
        /// Human-readable failure description, surfaced to the client.
        message: String,
    },
    /// Admission was refused because the broker for the target database is
    /// closed.
    #[error("permit broker is closed")]
    BrokerClosed,
    /// The producer side vanished without delivering a value.
    #[error("input channel unexpectedly closed")]
    InputClosed,
}

impl WorkerError {
    /// A [`WorkerError::Fault`] with the given message.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }
}
