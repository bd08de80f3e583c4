use crate::record::{LogEvent, Severity};
use crate::sink::LogSink;
use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// The three levels a browser console understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleBucket {
    Error,
    Warn,
    Info,
}

impl ConsoleBucket {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Emerg | Severity::Alert | Severity::Crit | Severity::Err => {
                ConsoleBucket::Error
            }
            Severity::Warn => ConsoleBucket::Warn,
            Severity::Notice | Severity::Info | Severity::Debug => ConsoleBucket::Info,
        }
    }

    /// Bucket for a raw numeric priority, `None` if it names no severity.
    pub fn for_priority(priority: i64) -> Option<Self> {
        Severity::from_priority(priority).map(Self::for_severity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleEntry {
    pub bucket: ConsoleBucket,
    pub message: String,
}

/// Sink that buffers events for relay to a browser console.
///
/// Transport is left to the caller, which drains the buffer once per
/// response. Events whose priority cannot be classified are reported once
/// through `tracing` and dropped for this sink only.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    entries: Mutex<Vec<ConsoleEntry>>,
    warned_unknown: AtomicBool,
    warned_missing: AtomicBool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message` under the bucket for `priority`. Returns whether
    /// the message was queued.
    pub fn relay(&self, priority: Option<i64>, message: impl Into<String>) -> bool {
        let Some(priority) = priority else {
            if !self.warned_missing.swap(true, Ordering::Relaxed) {
                tracing::warn!("console relay: event has no priority, skipping");
            }
            return false;
        };
        let Some(bucket) = ConsoleBucket::for_priority(priority) else {
            if !self.warned_unknown.swap(true, Ordering::Relaxed) {
                tracing::warn!(priority, "console relay: unknown log level");
            }
            return false;
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ConsoleEntry { bucket, message: message.into() });
        true
    }

    /// Take every queued entry, oldest first.
    pub fn drain(&self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

fn console_line(event: &LogEvent) -> String {
    format!("{}:{} {}", event.source_file, event.source_line, event.message)
}

#[async_trait]
impl LogSink for ConsoleSink {
    async fn send(&self, event: &LogEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.relay(event.priority, console_line(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::Registry;

    #[derive(Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings(f: impl FnOnce()) -> usize {
        let counter = WarnCounter::default();
        let subscriber = Registry::default().with(counter.clone());
        tracing::subscriber::with_default(subscriber, f);
        counter.0.load(Ordering::SeqCst)
    }

    #[test]
    fn severities_collapse_into_three_buckets() {
        use ConsoleBucket::*;
        let buckets: Vec<_> = Severity::ALL.iter().map(|s| ConsoleBucket::for_severity(*s)).collect();
        assert_eq!(buckets, vec![Error, Error, Error, Error, Warn, Info, Info, Info]);
    }

    #[test]
    fn unknown_priority_is_dropped_without_panicking() {
        let sink = ConsoleSink::new();
        assert!(!sink.relay(Some(42), "lost"));
        assert!(!sink.relay(Some(-1), "lost too"));
        assert!(sink.warned_unknown.load(Ordering::Relaxed));
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn unknown_priority_is_reported_once() {
        let sink = ConsoleSink::new();
        let warnings = count_warnings(|| {
            sink.relay(Some(42), "lost");
            sink.relay(Some(99), "lost again");
            sink.relay(Some(3), "kept");
        });
        assert_eq!(warnings, 1);
        assert_eq!(sink.drain().len(), 1);
    }

    #[test]
    fn missing_priority_is_reported_once() {
        let sink = ConsoleSink::new();
        let warnings = count_warnings(|| {
            sink.relay(None, "a");
            sink.relay(None, "b");
        });
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn send_skips_event_with_unknown_priority() {
        let sink = ConsoleSink::new();
        let mut event = LogEvent::new("odd", Severity::Err);
        event.priority = Some(42);
        sink.send(&event).await.unwrap();
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn missing_priority_is_dropped() {
        let sink = ConsoleSink::new();
        assert!(!sink.relay(None, "no level"));
        assert!(sink.warned_missing.load(Ordering::Relaxed));
        assert!(!sink.warned_unknown.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn send_queues_located_message() {
        let sink = ConsoleSink::new();
        let mut event = LogEvent::new("slow query", Severity::Warn);
        event.source_file = "app/db.rs".into();
        event.source_line = "88".into();
        sink.send(&event).await.unwrap();
        assert_eq!(
            sink.drain(),
            vec![ConsoleEntry { bucket: ConsoleBucket::Warn, message: "app/db.rs:88 slow query".into() }]
        );
        assert!(sink.drain().is_empty());
    }
}
