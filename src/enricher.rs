use crate::backtrace::{BacktraceWalker, StackProvider};
use crate::config::LoggerConfig;
use crate::context::{ContextProvider, RequestSnapshot, RequestStart};
use crate::record::LogEvent;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, OnceLock};

/// Hostname placeholder when the system lookup fails.
pub const HOSTNAME_UNKNOWN: &str = "Could not determine hostname !";

/// Each request data section is cut to this many characters.
pub const REQUEST_DATA_LIMIT: usize = 1000;

type HostnameLookup = fn() -> io::Result<OsString>;

/// Adds call-site, backtrace, request and host metadata to a [`LogEvent`].
///
/// Enrichment never fails: every field that cannot be determined is left
/// at the sentinel passed to [`Enricher::enrich`].
#[derive(Clone)]
pub struct Enricher {
    config: LoggerConfig,
    context: Arc<dyn ContextProvider>,
    walker: BacktraceWalker,
    hostname: HostnameLookup,
    // Read from config on first use.
    max_backtrace_lines: OnceLock<usize>,
}

impl Enricher {
    pub fn new(
        config: LoggerConfig,
        context: Arc<dyn ContextProvider>,
        walker: BacktraceWalker,
    ) -> Self {
        Enricher {
            config,
            context,
            walker,
            hostname: hostname::get,
            max_backtrace_lines: OnceLock::new(),
        }
    }

    /// Replace the system hostname lookup.
    pub fn with_hostname_lookup(mut self, lookup: HostnameLookup) -> Self {
        self.hostname = lookup;
        self
    }

    pub fn walker(&self) -> &BacktraceWalker {
        &self.walker
    }

    fn max_backtrace_lines(&self) -> usize {
        *self
            .max_backtrace_lines
            .get_or_init(|| self.config.max_backtrace_lines())
    }

    pub fn enrich(
        &self,
        event: &mut LogEvent,
        stack: &dyn StackProvider,
        not_available: &str,
        backtrace_enabled: bool,
    ) {
        let na = || not_available.to_string();

        let max_frames = if backtrace_enabled { self.max_backtrace_lines() } else { 0 };
        let capture = self.walker.capture(stack, max_frames);
        match capture.call_site.as_ref() {
            Some(site) => {
                event.source_file = site.file.clone();
                event.source_line = site.line.to_string();
            }
            None => {
                event.source_file = na();
                event.source_line = na();
            }
        }
        event.backtrace = capture.backtrace().unwrap_or_else(na);

        let snap = self.context.snapshot();
        event.store_code = snap.store_code.clone().unwrap_or_else(na);
        event.elapsed_seconds = snap
            .request_start
            .map(|start| format_elapsed(start, Utc::now()))
            .unwrap_or_else(na);

        event.request_method = non_empty(&snap.request_method)
            .or_else(|| non_empty(&snap.exec_mode))
            .unwrap_or_else(na);
        event.request_uri = non_empty(&snap.request_uri)
            .or_else(|| non_empty(&snap.script_path))
            .unwrap_or_else(na);
        event.user_agent = non_empty(&snap.user_agent).unwrap_or_else(na);
        event.request_data = summarize_request_data(&snap).unwrap_or_else(na);
        event.remote_addr = resolve_remote_addr(&snap).unwrap_or_else(na);

        event.hostname = match (self.hostname)() {
            Ok(name) if !name.is_empty() => name.to_string_lossy().into_owned(),
            Ok(_) => HOSTNAME_UNKNOWN.to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "hostname lookup failed");
                HOSTNAME_UNKNOWN.to_string()
            }
        };
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

/// Seconds between `start` and `now`: six decimals for a fractional start,
/// a whole number otherwise.
pub fn format_elapsed(start: RequestStart, now: DateTime<Utc>) -> String {
    match start {
        RequestStart::Precise(started) => {
            let now = now.timestamp_micros() as f64 / 1_000_000.0;
            format!("{:.6}", now - started)
        }
        RequestStart::Seconds(started) => format!("{}", now.timestamp() - started),
    }
}

fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

fn section(label: &str, map: &Map<String, Value>) -> Option<String> {
    if map.is_empty() {
        return None;
    }
    match serde_json::to_string(map) {
        Ok(json) => Some(format!("  {}|{}", label, truncate(&json, REQUEST_DATA_LIMIT))),
        Err(e) => {
            tracing::debug!(error = %e, section = label, "skipping request data");
            None
        }
    }
}

/// Newline-joined `GET`, `POST`, `FILES` and `RAWPOST` sections for the
/// parts of the request that are not empty.
pub fn summarize_request_data(snap: &RequestSnapshot) -> Option<String> {
    let mut sections: Vec<String> = [
        section("GET", &snap.query),
        section("POST", &snap.form),
        section("FILES", &snap.files),
    ]
    .into_iter()
    .flatten()
    .collect();

    if let Some(raw) = non_empty(&snap.raw_body) {
        sections.push(format!("  RAWPOST|{}", truncate(&raw, REQUEST_DATA_LIMIT)));
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n"))
    }
}

/// Forwarded-for header first, then the peer address.
pub fn resolve_remote_addr(snap: &RequestSnapshot) -> Option<String> {
    non_empty(&snap.forwarded_for).or_else(|| non_empty(&snap.remote_addr))
}
