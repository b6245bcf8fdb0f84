//! Builder adapting result handles into long-poll HTTP responses.

use std::sync::Arc;
use std::time::Duration;

use http::Response;
use http::header::CONTENT_TYPE;
use serde::Serialize;

use turnstile::{AdmissionConfig, ResultHandle};

use crate::body::LongPollBody;
use crate::envelope::{DefaultEnvelope, ErrorEnvelope};
use crate::relay;

/// Builds streaming responses for pending query results.
///
/// The body emits a newline heartbeat every heartbeat interval until the
/// handle settles, then exactly one JSON document (the payload on success,
/// the error envelope on failure). `Content-Type` is fixed at
/// `application/json`.
///
/// # Examples
///
/// ```rust,no_run
/// use turnstile::ResultHandle;
/// use turnstile_http::StreamingResponse;
///
/// # #[tokio::main]
/// # async fn main() {
/// let handle: ResultHandle<serde_json::Value> = ResultHandle::new();
/// let response = StreamingResponse::new().respond(handle);
/// # let _ = response;
/// # }
/// ```
#[derive(Clone)]
pub struct StreamingResponse {
    heartbeat_interval: Duration,
    envelope: Arc<dyn ErrorEnvelope>,
}

impl StreamingResponse {
    /// Creates a builder with a one-second heartbeat and the
    /// [`DefaultEnvelope`] error format.
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            envelope: Arc::new(DefaultEnvelope),
        }
    }

    /// Creates a builder using the configured keep-alive interval.
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new().heartbeat_interval(config.keepalive_interval)
    }

    /// Sets the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the error envelope format.
    pub fn envelope(mut self, envelope: impl ErrorEnvelope + 'static) -> Self {
        self.envelope = Arc::new(envelope);
        self
    }

    /// Builds the streaming response for `handle`.
    ///
    /// Spawns the keep-alive relay; must be called within a Tokio runtime.
    pub fn respond<T>(&self, handle: ResultHandle<T>) -> Response<LongPollBody>
    where
        T: Serialize + Send + 'static,
    {
        let frames = relay::spawn(handle, self.heartbeat_interval, Arc::clone(&self.envelope));
        Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(LongPollBody::new(frames))
            .expect("static response parts are valid")
    }
}

impl Default for StreamingResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("envelope", &"...")
            .finish()
    }
}
