use crate::backtrace::{ArgValue, CallType, RawFrame};
use crate::enricher::Enricher;
use crate::record::{LogEvent, Severity, NOT_AVAILABLE};
use crate::registry::SinkRegistry;
use crate::router::Router;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::Write as _;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are never routed, to avoid feeding diagnostics
/// back into the sinks that produced them.
const OWN_TARGET: &str = "tracing_log_router";

const MAX_SEND_ATTEMPTS: u32 = 5;

/// An enriched event on its way to one named target.
#[derive(Debug, Clone)]
struct Delivery {
    target: String,
    event: LogEvent,
}

/// `tracing_subscriber` layer that enriches each event, routes it by the
/// file it was logged from and forwards it to the selected sinks via a
/// bounded channel and background task.
///
/// Enrichment and routing run inline on the logging thread. Sink I/O is
/// fully decoupled from application threads.
pub struct RoutingLayer {
    enricher: Enricher,
    router: Router,
    registry: SinkRegistry,
    not_available: String,
    sender: mpsc::Sender<Delivery>,
    /// Total events seen by the layer.
    pub total_events: Arc<AtomicU64>,
    /// Deliveries successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Deliveries dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
}

impl RoutingLayer {
    /// Create a new layer and spawn a background task that pulls
    /// deliveries from a bounded channel and sends them to the sinks in
    /// `registry`.
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval` to avoid degenerate configurations. The task ends
    /// once the layer is dropped and the remaining batch is delivered.
    pub fn new(
        enricher: Enricher,
        router: Router,
        registry: SinkRegistry,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Delivery>(buffer);

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let sinks = registry.clone();
        let handle = tokio::spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let backoff = Duration::from_millis(100);
            let max_backoff = Duration::from_secs(10);

            loop {
                tokio::select! {
                    delivery = rx.recv() => match delivery {
                        Some(delivery) => {
                            batch.push(delivery);
                            if batch.len() >= batch_size {
                                if let Err(e) = send_batch(&sinks, &mut batch, backoff, max_backoff).await {
                                    tracing::warn!(error = %e, "dropping log batch");
                                }
                            }
                        }
                        None => {
                            if let Err(e) = send_batch(&sinks, &mut batch, backoff, max_backoff).await {
                                tracing::warn!(error = %e, "dropping final log batch");
                            }
                            flush_all(&sinks).await;
                            break;
                        }
                    },
                    _ = sleep(flush_interval) => {
                        if !batch.is_empty() {
                            if let Err(e) = send_batch(&sinks, &mut batch, backoff, max_backoff).await {
                                tracing::warn!(error = %e, "dropping log batch on flush");
                            }
                            flush_all(&sinks).await;
                        }
                    }
                }
            }
        });

        (Self {
            enricher,
            router,
            registry,
            not_available: NOT_AVAILABLE.to_string(),
            sender: tx,
            total_events,
            enqueued_events,
            dropped_events,
        }, handle)
    }

    /// Placeholder for metadata that cannot be determined.
    pub fn with_not_available(mut self, not_available: impl Into<String>) -> Self {
        self.not_available = not_available.into();
        self
    }

    /// Call-site discovery, routing and enrichment for one event. Returns
    /// the deliveries to enqueue, already filtered by target priority.
    fn prepare(
        &self,
        message: String,
        severity: Severity,
        priority: Option<i64>,
        stack: Vec<RawFrame>,
    ) -> Vec<Delivery> {
        let na = self.not_available.as_str();

        let located = self.enricher.walker().capture(&stack, 0);
        let filename = located
            .call_site
            .as_ref()
            .map(|site| site.file.as_str())
            .unwrap_or(na);

        // Without a target map every registered sink gets the event, with
        // no backtrace.
        let targets: Vec<(String, bool)> = match self.router.route(filename) {
            Some(mapped) => mapped.into_iter().collect(),
            None => self.registry.iter().map(|(name, _)| (name.to_string(), false)).collect(),
        };

        let targets: Vec<(String, bool)> = targets
            .into_iter()
            .filter(|(name, _)| match self.registry.get(name) {
                Some(target) => target.accepts(severity),
                None => {
                    tracing::debug!(target_name = %name, "no sink registered for target");
                    false
                }
            })
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let wants_backtrace = targets.iter().any(|(_, bt)| *bt);
        let mut event = LogEvent::with_sentinel(message, severity, na);
        event.priority = priority;
        self.enricher.enrich(&mut event, &stack, na, wants_backtrace);

        targets
            .into_iter()
            .map(|(target, backtrace)| {
                let mut event = event.clone();
                if !backtrace {
                    event.backtrace = na.to_string();
                }
                Delivery { target, event }
            })
            .collect()
    }
}

/// Deliver every entry of `batch`, retrying each failed send with
/// backoff. A target that still fails after `MAX_SEND_ATTEMPTS` loses its
/// remaining deliveries in this batch; other targets are unaffected.
async fn send_batch(
    sinks: &SinkRegistry,
    batch: &mut Vec<Delivery>,
    backoff: Duration,
    max_backoff: Duration,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut given_up: HashSet<String> = HashSet::new();
    let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;

    for delivery in std::mem::take(batch) {
        if given_up.contains(&delivery.target) {
            continue;
        }
        let Some(target) = sinks.get(&delivery.target) else {
            continue;
        };

        let mut attempts = 0;
        let mut delay = backoff;
        loop {
            let Err(e) = target.sink.send(&delivery.event).await else {
                break;
            };
            attempts += 1;
            if attempts >= MAX_SEND_ATTEMPTS {
                tracing::warn!(target_name = %delivery.target, error = %e, "log sink keeps failing, dropping its deliveries");
                given_up.insert(delivery.target.clone());
                last_err = Some(e);
                break;
            }
            tracing::warn!(target_name = %delivery.target, error = %e, backoff = ?delay, "log sink send failed, retrying");
            sleep(delay).await;
            delay = std::cmp::min(delay * 2, max_backoff);
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn flush_all(sinks: &SinkRegistry) {
    for (name, target) in sinks.iter() {
        if let Err(e) = target.sink.flush().await {
            tracing::warn!(target_name = name, error = %e, "log sink flush failed");
        }
    }
}

impl<S> Layer<S> for RoutingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut args = Vec::new();
            attrs.record(&mut ArgVisitor { args: &mut args });
            span.extensions_mut().insert(SpanArgs(args));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        // An out-of-range priority is kept as is so that sinks classifying
        // by priority can report it; everything else uses the level.
        let priority = visitor.priority;
        let severity = priority
            .and_then(Severity::from_priority)
            .unwrap_or_else(|| Severity::from_level(meta.level()));
        let priority = priority.or(Some(severity.priority()));

        // The event's own location is the façade entry, enclosing spans
        // (innermost first) are its callers.
        let mut stack = vec![RawFrame {
            file: meta.file().map(str::to_string),
            line: meta.line(),
            function: "log".to_string(),
            class: Some(self.enricher.walker().facade().to_string()),
            call_type: Some(CallType::Static),
            args: Vec::new(),
        }];
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                let span_meta = span.metadata();
                let args = span
                    .extensions()
                    .get::<SpanArgs>()
                    .map(|a| a.0.clone())
                    .unwrap_or_default();
                stack.push(RawFrame {
                    file: span_meta.file().map(str::to_string),
                    line: span_meta.line(),
                    function: span_meta.name().to_string(),
                    class: Some(span_meta.target().to_string()),
                    call_type: Some(CallType::Static),
                    args,
                });
            }
        }

        for delivery in self.prepare(visitor.message(), severity, priority, stack) {
            match self.sender.try_send(delivery) {
                Ok(()) => {
                    self.enqueued_events.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.dropped_events.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "log channel full, dropping log event");
                }
            }
        }
    }
}

/// Span fields, rendered as backtrace arguments.
struct SpanArgs(Vec<ArgValue>);

struct ArgVisitor<'a> {
    args: &'a mut Vec<ArgValue>,
}

impl<'a> Visit for ArgVisitor<'a> {
    fn record_str(&mut self, _field: &Field, value: &str) {
        self.args.push(ArgValue::Text(value.to_string()));
    }

    fn record_i64(&mut self, _field: &Field, value: i64) {
        self.args.push(ArgValue::integer(value));
    }

    fn record_u64(&mut self, _field: &Field, value: u64) {
        self.args.push(ArgValue::integer(value as i64));
    }

    fn record_f64(&mut self, _field: &Field, value: f64) {
        self.args.push(ArgValue::double(value));
    }

    fn record_bool(&mut self, _field: &Field, value: bool) {
        self.args.push(ArgValue::boolean(value));
    }

    fn record_debug(&mut self, _field: &Field, value: &dyn std::fmt::Debug) {
        self.args.push(ArgValue::Text(format!("{:?}", value)));
    }
}

/// Collects the message, an optional numeric `priority` override and the
/// remaining fields as `key=value` pairs.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    priority: Option<i64>,
    fields: Vec<(String, String)>,
}

impl EventVisitor {
    fn message(self) -> String {
        let mut out = self.message.unwrap_or_default();
        for (key, value) in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{}={}", key, value);
        }
        out
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "priority" {
            self.priority = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "priority" {
            self.priority = Some(i64::try_from(value).unwrap_or(i64::MAX));
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.push((field.name().to_string(), format!("{:?}", value)));
        }
    }
}
