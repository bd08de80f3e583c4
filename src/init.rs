use crate::backtrace::{BacktraceWalker, BasePath, DEFAULT_FACADE};
use crate::config::{ConfigProvider, LoggerConfig};
use crate::context::ProcessContext;
use crate::enricher::Enricher;
use crate::layer::RoutingLayer;
use crate::record::NOT_AVAILABLE;
use crate::registry::SinkRegistry;
use crate::router::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the routing layer.
///
/// Controls the size of the internal buffer, the maximum batch size when
/// delivering to sinks, how often a partial batch is flushed, whether
/// events are also printed to the console through the `fmt` layer, and the
/// placeholder for metadata that cannot be determined.
///
/// **Fields**
/// - `channel_buffer`: maximum number of pending deliveries before new
///   ones are dropped.
/// - `batch_size`: deliveries per batch.
/// - `flush_interval`: maximum time between flushes of a partial batch.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked on top of the [`RoutingLayer`].
/// - `not_available`: sentinel stored in undeterminable event fields.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub enable_stdout: bool,
    pub not_available: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            enable_stdout: true,
            not_available: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Build a [`RoutingLayer`] from logger settings and named sinks.
///
/// Request metadata comes from a [`ProcessContext`]; file paths are shown
/// relative to the parent of the current directory. Must be called inside
/// a Tokio runtime.
pub fn build_layer(
    provider: Arc<dyn ConfigProvider>,
    sinks: SinkRegistry,
    config: &LayerConfig,
) -> (RoutingLayer, JoinHandle<()>) {
    let settings = LoggerConfig::new(provider);
    let base = std::env::current_dir()
        .map(BasePath::from_app_root)
        .unwrap_or_default();
    let enricher = Enricher::new(
        settings.clone(),
        Arc::new(ProcessContext::default()),
        BacktraceWalker::new(DEFAULT_FACADE, base),
    );
    let (layer, handle) = RoutingLayer::new(
        enricher,
        Router::new(settings),
        sinks,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
    );
    (layer.with_not_available(config.not_available.clone()), handle)
}

/// Install the routing layer as the global `tracing` subscriber.
///
/// **Parameters**
/// - `provider`: source of logger settings (target map, backtrace depth,
///   priorities).
/// - `sinks`: sinks addressable by the target map.
/// - `config`: [`LayerConfig`] controlling buffering and batching.
///
/// **Returns**
/// - The handle of the background delivery task, or an error if a global
///   subscriber was already installed.
pub fn init_tracing_with_config(
    provider: Arc<dyn ConfigProvider>,
    sinks: SinkRegistry,
    config: LayerConfig,
) -> Result<JoinHandle<()>, SetGlobalDefaultError> {
    let (layer, handle) = build_layer(provider, sinks, &config);

    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(handle)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(
    provider: Arc<dyn ConfigProvider>,
    sinks: SinkRegistry,
) -> Result<JoinHandle<()>, SetGlobalDefaultError> {
    init_tracing_with_config(provider, sinks, LayerConfig::default())
}
