use serde::Serialize;
use std::fmt;
use tracing::Level;

/// Placeholder used for metadata fields that could not be determined,
/// unless the caller supplies its own.
pub const NOT_AVAILABLE: &str = "N/A";

/// Eight-level syslog style severity. Lower numeric priority means more
/// severe, `Emerg` is `0` and `Debug` is `7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warn = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Severity {
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Err,
        Severity::Warn,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    /// Numeric priority of this severity.
    pub fn priority(self) -> i64 {
        self as i64
    }

    /// Look up a severity by numeric priority; `None` for anything outside
    /// `0..=7`.
    pub fn from_priority(priority: i64) -> Option<Severity> {
        Self::ALL.iter().copied().find(|s| s.priority() == priority)
    }

    /// Severity used for a `tracing` event of the given level.
    pub fn from_level(level: &Level) -> Severity {
        match *level {
            Level::ERROR => Severity::Err,
            Level::WARN => Severity::Warn,
            Level::INFO => Severity::Info,
            _ => Severity::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emerg => "EMERG",
            Severity::Alert => "ALERT",
            Severity::Crit => "CRIT",
            Severity::Err => "ERR",
            Severity::Warn => "WARN",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log call, populated once by the [`Enricher`] and then handed to
/// the sinks the [`Router`] selected.
///
/// Every metadata field holds the sentinel passed to the enricher when it
/// could not be determined.
///
/// [`Enricher`]: crate::enricher::Enricher
/// [`Router`]: crate::router::Router
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub severity: Severity,
    /// Numeric priority as logged. May name no known severity, in which
    /// case `severity` holds the level the event was emitted at and sinks
    /// that classify by priority must skip it.
    pub priority: Option<i64>,
    pub source_file: String,
    pub source_line: String,
    pub backtrace: String,
    pub store_code: String,
    pub elapsed_seconds: String,
    pub request_method: String,
    pub request_uri: String,
    pub user_agent: String,
    pub request_data: String,
    pub remote_addr: String,
    pub hostname: String,
}

impl LogEvent {
    /// Create an event with every metadata field set to [`NOT_AVAILABLE`].
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self::with_sentinel(message, severity, NOT_AVAILABLE)
    }

    pub fn with_sentinel(
        message: impl Into<String>,
        severity: Severity,
        not_available: &str,
    ) -> Self {
        let na = || not_available.to_string();
        LogEvent {
            message: message.into(),
            severity,
            priority: Some(severity.priority()),
            source_file: na(),
            source_line: na(),
            backtrace: na(),
            store_code: na(),
            elapsed_seconds: na(),
            request_method: na(),
            request_uri: na(),
            user_agent: na(),
            request_data: na(),
            remote_addr: na(),
            hostname: na(),
        }
    }
}
