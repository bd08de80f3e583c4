use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use tracing_log_router::{
    config::MapConfig,
    console::ConsoleSink,
    init::{init_tracing_with_config, LayerConfig},
    registry::SinkRegistry,
};

#[tokio::main]
async fn main() {
    let console = Arc::new(ConsoleSink::new());
    let mut sinks = SinkRegistry::new();
    sinks.register("chromelogger", console.clone());

    // No target map: every registered sink receives every event.
    let layer_config = LayerConfig {
        enable_stdout: false,
        flush_interval: Duration::from_millis(50),
        ..LayerConfig::default()
    };
    init_tracing_with_config(Arc::new(MapConfig::new()), sinks, layer_config)
        .expect("install subscriber");

    info!("page rendered");
    warn!(ms = 830, "slow block");
    error!("template missing");

    sleep(Duration::from_millis(200)).await;
    for entry in console.drain() {
        println!("{}", serde_json::to_string(&entry).unwrap_or_default());
    }
}
