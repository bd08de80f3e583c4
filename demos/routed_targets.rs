use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span};
use tracing_log_router::{
    config::MapConfig,
    init::{init_tracing_with_config, LayerConfig},
    noop_sink::NoopSink,
    record::LogEvent,
    registry::SinkRegistry,
    sink::LogSink,
};

/// Stand-in for a database sink: prints the row it would insert.
struct PrintSink(&'static str);

#[async_trait]
impl LogSink for PrintSink {
    async fn send(&self, event: &LogEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        println!(
            "[{}] {} {}:{} {}\n{}",
            self.0, event.severity, event.source_file, event.source_line, event.message, event.backtrace
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let config = MapConfig::new()
        .set("general/max_backtrace_lines", "10")
        .set(
            "general/target_map",
            r#"[
                {"pattern": "demos/.*", "target": "db", "backtrace": 1, "stop_on_match": 1},
                {"pattern": ".*", "target": "discard", "backtrace": 0}
            ]"#,
        );

    let mut sinks = SinkRegistry::new();
    sinks
        .register("db", Arc::new(PrintSink("db")))
        .register("discard", Arc::new(NoopSink));

    let layer_config = LayerConfig { enable_stdout: false, ..LayerConfig::default() };
    init_tracing_with_config(Arc::new(config), sinks, layer_config).expect("install subscriber");

    let span = info_span!("import", batch = 3, source = "supplier-feed.csv");
    let _guard = span.enter();
    info!("import started");
    error!(sku = "A-100", "price missing");

    sleep(Duration::from_secs(2)).await;
}
