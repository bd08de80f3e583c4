use crate::record::LogEvent;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all events.
///
/// Useful for measuring the overhead of enrichment and routing without any
/// external I/O, and as a placeholder target in routing tests.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _event: &LogEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;

    #[tokio::test]
    async fn accepts_everything() {
        let sink = NoopSink;
        assert!(sink.send(&LogEvent::new("x", Severity::Emerg)).await.is_ok());
        assert!(sink.flush().await.is_ok());
    }
}
