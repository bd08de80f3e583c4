use crate::record::LogEvent;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for finished [`LogEvent`]s.
///
/// Implementations own their transport and formatting (database rows,
/// files, browser console relay, etc). The layer calls `send` from a
/// background task and never awaits it on the application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver a single enriched event.
    ///
    /// **Parameters**
    /// - `event`: event populated by the enricher. Its `severity` is the
    ///   resolved severity the sink should classify by.
    ///
    /// **Returns**
    /// - `Ok(())` if the event was accepted or deliberately skipped.
    /// - `Err(..)` if the backend failed. The layer treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, event: &LogEvent) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered events, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
