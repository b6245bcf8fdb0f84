//! Keep-alive relay between a pending result and a response body.
//!
//! The relay watches one [`ResultHandle`] and drives a sliding one-slot
//! buffer of [`RelayFrame`]s. Every heartbeat interval it offers a heartbeat;
//! when the handle settles it offers the terminal JSON document and exits.
//! An unconsumed heartbeat is simply overwritten by the next frame, so a slow
//! client connection never accumulates queued heartbeats.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use turnstile::{ResultHandle, WorkerError};

use crate::envelope::ErrorEnvelope;

/// Frame observed by the response body.
#[derive(Debug, Clone)]
pub enum RelayFrame {
    /// Initial slot value; never written to the wire.
    Idle,
    /// Keep the connection alive: one newline byte.
    Heartbeat,
    /// The JSON document that closes the response. Always the final frame.
    Terminal(Bytes),
}

/// Spawns the relay task for `handle` and returns its frame receiver.
///
/// Dropping the receiver signals that the client went away: the relay closes
/// the handle (cancelling the worker) and exits.
///
/// Must be called within a Tokio runtime.
pub fn spawn<T>(
    handle: ResultHandle<T>,
    heartbeat_interval: Duration,
    envelope: Arc<dyn ErrorEnvelope>,
) -> watch::Receiver<RelayFrame>
where
    T: Serialize + Send + 'static,
{
    let (frames_tx, frames_rx) = watch::channel(RelayFrame::Idle);
    tokio::spawn(run(handle, heartbeat_interval, envelope, frames_tx));
    frames_rx
}

async fn run<T>(
    handle: ResultHandle<T>,
    heartbeat_interval: Duration,
    envelope: Arc<dyn ErrorEnvelope>,
    frames: watch::Sender<RelayFrame>,
) where
    T: Serialize,
{
    let mut ticker = time::interval_at(
        time::Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            outcome = handle.recv() => {
                let document = match outcome {
                    Ok(Ok(payload)) => encode_payload(&payload, envelope.as_ref()),
                    Ok(Err(fault)) => encode_error(&fault, envelope.as_ref()),
                    Err(_closed) => {
                        warn!("input channel unexpectedly closed before a result arrived");
                        encode_error(&WorkerError::InputClosed, envelope.as_ref())
                    }
                };
                // Overwrites any heartbeat still sitting in the slot, so the
                // terminal document is always the last frame.
                let _ = frames.send(RelayFrame::Terminal(document));
                break;
            }
            _ = ticker.tick() => {
                if frames.send(RelayFrame::Heartbeat).is_err() {
                    info!("client went away during keep-alive; cancelling query");
                    handle.close();
                    break;
                }
            }
            _ = frames.closed() => {
                info!("response body dropped; cancelling query");
                handle.close();
                break;
            }
        }
    }
}

fn encode_payload<T: Serialize>(payload: &T, envelope: &dyn ErrorEnvelope) -> Bytes {
    match serde_json::to_vec(payload) {
        Ok(encoded) => Bytes::from(encoded),
        Err(fault) => {
            error!(%fault, "failed to encode query payload");
            encode_error(
                &WorkerError::fault(format!("failed to encode query payload: {fault}")),
                envelope,
            )
        }
    }
}

fn encode_error(error: &WorkerError, envelope: &dyn ErrorEnvelope) -> Bytes {
    Bytes::from(envelope.envelope(error).to_string())
}
