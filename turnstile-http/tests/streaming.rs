//! End-to-end tests: admission through the streaming response body.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::header::CONTENT_TYPE;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::time::timeout;
use turnstile::{
    Admission, AdmissionConfig, CancellationToken, DatabaseId, QueryResult, ResultHandle,
    WorkerError,
};
use turnstile_http::{ErrorEnvelope, LongPollBody, StreamingResponse};

const WAIT: Duration = Duration::from_secs(5);

fn admission(limit: usize) -> Admission {
    Admission::new(
        AdmissionConfig::builder()
            .max_simultaneous_queries_per_db(limit)
            .build(),
    )
}

/// Blocks in small steps so cancellation is observed promptly.
fn sleepy(total: Duration, value: Value) -> impl FnOnce(CancellationToken) -> QueryResult<Value> {
    move |cancel| {
        let step = Duration::from_millis(5);
        let mut slept = Duration::ZERO;
        while slept < total {
            if cancel.is_cancelled() {
                return Err(WorkerError::fault("cancelled"));
            }
            std::thread::sleep(step);
            slept += step;
        }
        Ok(value)
    }
}

async fn collect(body: LongPollBody) -> Vec<u8> {
    let collected = timeout(WAIT, body.collect()).await.unwrap().unwrap();
    collected.to_bytes().to_vec()
}

/// Splits the wire stream into its heartbeat prefix and the JSON document.
fn split_heartbeats(bytes: &[u8]) -> (usize, Value) {
    let heartbeats = bytes.iter().take_while(|byte| **byte == b'\n').count();
    let document = serde_json::from_slice(&bytes[heartbeats..]).unwrap();
    (heartbeats, document)
}

#[tokio::test]
async fn fast_result_streams_without_heartbeats() {
    let admission = admission(2);
    let handle = admission.submit(
        DatabaseId::from(1),
        sleepy(Duration::from_millis(50), json!([1, 2, 3])),
    );

    let response = StreamingResponse::new().respond(handle);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

    let bytes = collect(response.into_body()).await;
    assert_eq!(bytes, b"[1,2,3]");
}

#[tokio::test]
async fn slow_result_is_preceded_by_heartbeats() {
    let admission = admission(2);
    let handle = admission.submit(
        DatabaseId::from(2),
        sleepy(Duration::from_millis(350), json!({"ok": true})),
    );

    let response = StreamingResponse::new()
        .heartbeat_interval(Duration::from_millis(100))
        .respond(handle);
    let bytes = collect(response.into_body()).await;

    let (heartbeats, document) = split_heartbeats(&bytes);
    assert!(
        heartbeats >= 2,
        "expected at least two heartbeats, got {heartbeats}"
    );
    assert_eq!(document, json!({"ok": true}));
    // The terminal document is the last thing on the wire.
    assert_eq!(*bytes.last().unwrap(), b'}');
}

#[tokio::test]
async fn dropped_body_cancels_the_query_and_frees_the_permit() {
    let admission = admission(1);
    let db = DatabaseId::from(3);
    let cancelled = Arc::new(AtomicBool::new(false));
    let observed = cancelled.clone();

    let handle = admission.submit(db, move |cancel| {
        loop {
            if cancel.is_cancelled() {
                observed.store(true, Ordering::SeqCst);
                return Err::<Value, _>(WorkerError::fault("cancelled"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    let response = StreamingResponse::new()
        .heartbeat_interval(Duration::from_millis(100))
        .respond(handle.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The client went away.
    drop(response);

    let broker = admission.registry().broker_for(db);
    let deadline = tokio::time::Instant::now() + WAIT;
    while !(cancelled.load(Ordering::SeqCst) && broker.available_permits() == 1) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker not cancelled after body drop"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.is_closed());
}

#[tokio::test]
async fn worker_fault_streams_the_error_envelope() {
    let admission = admission(1);
    let handle = admission.submit(DatabaseId::from(4), |_cancel| {
        Err::<Value, _>(WorkerError::fault("boom"))
    });

    let response = StreamingResponse::new().respond(handle);
    let bytes = collect(response.into_body()).await;

    let (_, document) = split_heartbeats(&bytes);
    assert_eq!(document["status"], "failed");
    assert_eq!(document["message"], "boom");
}

#[tokio::test]
async fn closed_input_streams_a_synthesized_error() {
    let handle = ResultHandle::<Value>::new();
    let response = StreamingResponse::new().respond(handle.clone());
    handle.close();

    let bytes = collect(response.into_body()).await;
    let (_, document) = split_heartbeats(&bytes);
    assert_eq!(document["message"], "input channel unexpectedly closed");
}

#[tokio::test]
async fn custom_envelope_shapes_the_error_document() {
    struct LegacyEnvelope;

    impl ErrorEnvelope for LegacyEnvelope {
        fn envelope(&self, error: &WorkerError) -> Value {
            json!({ "error": error.to_string() })
        }
    }

    let admission = admission(1);
    let handle = admission.submit(DatabaseId::from(6), |_cancel| {
        Err::<Value, _>(WorkerError::fault("boom"))
    });

    let response = StreamingResponse::new()
        .envelope(LegacyEnvelope)
        .respond(handle);
    let bytes = collect(response.into_body()).await;

    let (_, document) = split_heartbeats(&bytes);
    assert_eq!(document["error"], "boom");
}
