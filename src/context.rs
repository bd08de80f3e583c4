use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// When the current request started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestStart {
    /// Unix time in fractional seconds.
    Precise(f64),
    /// Unix time in whole seconds.
    Seconds(i64),
}

/// Read-only snapshot of the request and process environment that the
/// enricher copies into each event.
///
/// Every field is optional; the enricher substitutes its sentinel for
/// anything left unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSnapshot {
    pub store_code: Option<String>,
    pub request_start: Option<RequestStart>,
    pub request_method: Option<String>,
    pub request_uri: Option<String>,
    pub user_agent: Option<String>,
    /// Process execution mode, used when there is no request method.
    pub exec_mode: Option<String>,
    /// Currently executing script, used when there is no request URI.
    pub script_path: Option<String>,
    pub query: Map<String, Value>,
    pub form: Map<String, Value>,
    pub files: Map<String, Value>,
    pub raw_body: Option<String>,
    pub forwarded_for: Option<String>,
    pub remote_addr: Option<String>,
}

/// Supplies the [`RequestSnapshot`] for the event being logged.
pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> RequestSnapshot;
}

impl ContextProvider for RequestSnapshot {
    fn snapshot(&self) -> RequestSnapshot {
        self.clone()
    }
}

fn process_start() -> f64 {
    static STARTED: OnceLock<f64> = OnceLock::new();
    *STARTED.get_or_init(|| Utc::now().timestamp_micros() as f64 / 1_000_000.0)
}

/// Context for code running outside of any request: execution mode `cli`,
/// the binary path as script and the first use of this provider as the
/// start time.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    store_code: Option<String>,
}

impl ProcessContext {
    pub fn new(store_code: Option<String>) -> Self {
        process_start();
        ProcessContext { store_code }
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ContextProvider for ProcessContext {
    fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            store_code: self.store_code.clone(),
            request_start: Some(RequestStart::Precise(process_start())),
            exec_mode: Some("cli".to_string()),
            script_path: std::env::args().next(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_context_has_no_request_fields() {
        let snap = ProcessContext::new(Some("admin".into())).snapshot();
        assert_eq!(snap.store_code.as_deref(), Some("admin"));
        assert_eq!(snap.exec_mode.as_deref(), Some("cli"));
        assert!(snap.request_method.is_none());
        assert!(matches!(snap.request_start, Some(RequestStart::Precise(_))));
    }

    #[test]
    fn process_start_is_stable() {
        let a = ProcessContext::default().snapshot().request_start;
        let b = ProcessContext::default().snapshot().request_start;
        assert_eq!(a, b);
    }
}
