//! Error envelope formatting.

use serde_json::{Value, json};
use turnstile::WorkerError;

/// Shapes the JSON error document sent to a client whose query failed.
///
/// Injected into [`StreamingResponse`](crate::StreamingResponse) so servers
/// can keep their existing error wire format.
pub trait ErrorEnvelope: Send + Sync {
    /// The JSON document describing `error`.
    fn envelope(&self, error: &WorkerError) -> Value;
}

/// Default envelope: `{"status": "failed", "message": <error>}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnvelope;

impl ErrorEnvelope for DefaultEnvelope {
    fn envelope(&self, error: &WorkerError) -> Value {
        json!({
            "status": "failed",
            "message": error.to_string(),
        })
    }
}
