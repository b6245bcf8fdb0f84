//! Admission entry point: couples a worker invocation to a permit and a
//! result handle.

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broker::PermitBroker;
use crate::config::AdmissionConfig;
use crate::error::WorkerError;
use crate::handle::{QueryResult, ResultHandle};
use crate::registry::{BrokerRegistry, DatabaseId};

/// Admission front door for query execution.
///
/// [`submit`](Admission::submit) queues a worker behind the target database's
/// permit broker and immediately returns a [`ResultHandle`] for the eventual
/// outcome. Closing the handle before completion cancels the worker and
/// returns its permit.
///
/// # Execution model
///
/// The per-submission supervisor (permit acquisition, cancellation watch)
/// runs as a lightweight task on the Tokio runtime; the worker itself runs on
/// the blocking worker pool and may block arbitrarily. Cancellation is
/// cooperative: workers are handed a [`CancellationToken`] and are expected
/// to check it between units of work, so cancellation latency is bounded by
/// the worker's responsiveness to the token.
#[derive(Debug, Clone)]
pub struct Admission {
    registry: BrokerRegistry,
}

impl Admission {
    /// Creates an admission front door over a fresh [`BrokerRegistry`].
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            registry: BrokerRegistry::new(config),
        }
    }

    /// Creates an admission front door over an existing registry.
    pub fn with_registry(registry: BrokerRegistry) -> Self {
        Self { registry }
    }

    /// The underlying broker registry.
    pub fn registry(&self) -> &BrokerRegistry {
        &self.registry
    }

    /// Submits `worker` for execution against `database`.
    ///
    /// The worker starts only once a permit is available; at most
    /// `max-simultaneous-queries-per-db` workers run concurrently per
    /// database. Exactly one of three terminal states is observed on the
    /// returned handle: a value, an error, or closed-without-value.
    ///
    /// Must be called within a Tokio runtime.
    pub fn submit<T, F>(&self, database: DatabaseId, worker: F) -> ResultHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> QueryResult<T> + Send + 'static,
    {
        let handle = ResultHandle::new();
        let broker = self.registry.broker_for(database);
        tokio::spawn(supervise(broker, handle.clone(), worker));
        handle
    }
}

/// Drives one submission: acquire permit, run worker, wire cancellation.
async fn supervise<T, F>(broker: PermitBroker, handle: ResultHandle<T>, worker: F)
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> QueryResult<T> + Send + 'static,
{
    let permit = tokio::select! {
        // The caller gave up while still queued; the abandoned acquire
        // consumes no permit.
        _ = handle.closed() => return,
        acquired = broker.acquire() => match acquired {
            Ok(permit) => permit,
            Err(_closed) => {
                handle.deliver(Err(WorkerError::BrokerClosed));
                return;
            }
        },
    };

    if broker.is_closed() || handle.is_closed() || handle.is_settled() {
        permit.release();
        return;
    }

    let cancel = CancellationToken::new();
    let worker_token = cancel.clone();
    let mut worker_task: JoinHandle<QueryResult<T>> =
        tokio::task::spawn_blocking(move || worker(worker_token));

    tokio::select! {
        finished = &mut worker_task => publish(&handle, finished),
        _ = handle.closed() => {
            debug!("result handle closed; cancelling worker");
            cancel.cancel();
            // The permit stays held until the worker actually terminates.
            let finished = worker_task.await;
            publish(&handle, finished);
        }
    }

    permit.release();
}

/// Publishes a finished worker's outcome, converting panics to faults.
fn publish<T>(handle: &ResultHandle<T>, finished: Result<QueryResult<T>, JoinError>) {
    match finished {
        Ok(outcome) => {
            handle.deliver(outcome);
        }
        Err(join_error) => {
            handle.deliver(Err(WorkerError::fault(panic_message(join_error))));
        }
    }
}

fn panic_message(join_error: JoinError) -> String {
    match join_error.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "worker panicked".to_string()
            }
        }
        Err(_) => "worker task aborted".to_string(),
    }
}
