//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, registry::LookupSpan};

/// Captured warning messages, shared with the installed layer.
#[derive(Clone, Default)]
pub struct WarningCollector {
    warnings: Arc<Mutex<Vec<String>>>,
}

impl WarningCollector {
    pub fn count(&self) -> usize {
        self.warnings.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

struct WarningCaptureLayer {
    collector: WarningCollector,
}

impl<S> Layer<S> for WarningCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = MessageVisitor { message: None };
            event.record(&mut visitor);
            self.collector
                .warnings
                .lock()
                .unwrap()
                .push(visitor.message.unwrap_or_default());
        }
    }
}

/// Installs a thread-local subscriber that records warning events.
///
/// Keep the returned guard alive for the duration of the test; use a
/// current-thread runtime so spawned tasks log on this thread.
pub fn capture_warnings() -> (WarningCollector, tracing::subscriber::DefaultGuard) {
    let collector = WarningCollector::default();
    let subscriber = Registry::default().with(WarningCaptureLayer {
        collector: collector.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (collector, guard)
}

/// Polls `predicate` until it holds or a two-second deadline passes.
pub async fn eventually(predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
