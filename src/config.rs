use crate::env::{env_key, LOGGER_ENV_PREFIX};
use crate::error::ConfigError;
use crate::record::Severity;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const PATH_PRIORITY: &str = "general/priority";
pub const PATH_MAX_BACKTRACE_LINES: &str = "general/max_backtrace_lines";
pub const PATH_TARGET_MAP: &str = "general/target_map";
pub const PATH_MAX_DAYS_TO_KEEP: &str = "db/max_days_to_keep";

/// Read-only source of string-keyed logger settings.
///
/// Paths are slash separated (`general/priority`). Missing values return
/// `None`; the typed accessors on [`LoggerConfig`] decide the fallback.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, path: &str) -> Option<String>;
}

/// In-memory configuration, handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: BTreeMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }
}

impl ConfigProvider for MapConfig {
    fn get(&self, path: &str) -> Option<String> {
        self.values.get(path).cloned()
    }
}

/// Configuration backed by process environment variables.
///
/// See [`crate::env`] for the naming scheme.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        EnvConfig { prefix: prefix.into() }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(LOGGER_ENV_PREFIX)
    }
}

impl ConfigProvider for EnvConfig {
    fn get(&self, path: &str) -> Option<String> {
        std::env::var(env_key(&self.prefix, path)).ok()
    }
}

/// Typed view over a [`ConfigProvider`].
#[derive(Clone)]
pub struct LoggerConfig {
    provider: Arc<dyn ConfigProvider>,
}

impl LoggerConfig {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        LoggerConfig { provider }
    }

    /// Raw string at `path`, empty strings treated as missing.
    pub fn value(&self, path: &str) -> Option<String> {
        self.provider
            .get(path)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn integer(&self, path: &str) -> Result<Option<i64>, ConfigError> {
        match self.value(path) {
            None => Ok(None),
            Some(value) => value
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidInteger { path: path.to_string(), value }),
        }
    }

    /// Global minimum priority, if configured.
    pub fn priority_threshold(&self) -> Result<Option<i64>, ConfigError> {
        self.integer(PATH_PRIORITY)
    }

    /// Priority filter to attach to a sink.
    ///
    /// The sink-specific path wins unless it is missing or `default`, in
    /// which case the global priority applies. A threshold equal to WARN
    /// means no filter is needed and yields `None`.
    pub fn priority_filter(&self, sink_path: Option<&str>) -> Result<Option<i64>, ConfigError> {
        let own = match sink_path {
            Some(path) => match self.value(path) {
                Some(v) if v == "default" => None,
                Some(_) => self.integer(path)?,
                None => None,
            },
            None => None,
        };
        let threshold = match own {
            Some(p) => Some(p),
            None => self.priority_threshold()?,
        };
        Ok(threshold.filter(|p| *p != Severity::Warn.priority()))
    }

    /// Maximum backtrace lines per event; `0` disables capture. Unreadable
    /// or negative values count as `0`.
    pub fn max_backtrace_lines(&self) -> usize {
        match self.integer(PATH_MAX_BACKTRACE_LINES) {
            Ok(Some(n)) if n > 0 => n as usize,
            Ok(_) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring max backtrace lines");
                0
            }
        }
    }

    /// Serialized target map, if any.
    pub fn target_map(&self) -> Option<String> {
        self.value(PATH_TARGET_MAP)
    }

    pub fn max_days_to_keep(&self) -> Result<Option<u32>, ConfigError> {
        match self.integer(PATH_MAX_DAYS_TO_KEEP)? {
            Some(days) if days > 0 => Ok(Some(days.min(u32::MAX as i64) as u32)),
            _ => Ok(None),
        }
    }

    /// Rows older than the returned instant may be deleted by the
    /// retention job. `None` keeps everything.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ConfigError> {
        Ok(self
            .max_days_to_keep()?
            .map(|days| now - Duration::days(days as i64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(map: MapConfig) -> LoggerConfig {
        LoggerConfig::new(Arc::new(map))
    }

    #[test]
    fn sink_priority_overrides_global() {
        let cfg = config(MapConfig::new().set("general/priority", "6").set("db/priority", "2"));
        assert_eq!(cfg.priority_filter(Some("db/priority")).unwrap(), Some(2));
    }

    #[test]
    fn default_sink_priority_uses_global() {
        let cfg = config(MapConfig::new().set("general/priority", "6").set("db/priority", "default"));
        assert_eq!(cfg.priority_filter(Some("db/priority")).unwrap(), Some(6));
        assert_eq!(cfg.priority_filter(Some("mail/priority")).unwrap(), Some(6));
        assert_eq!(cfg.priority_filter(None).unwrap(), Some(6));
    }

    #[test]
    fn warn_threshold_needs_no_filter() {
        let cfg = config(MapConfig::new().set("general/priority", "4"));
        assert_eq!(cfg.priority_filter(None).unwrap(), None);
        assert_eq!(config(MapConfig::new()).priority_filter(None).unwrap(), None);
    }

    #[test]
    fn malformed_priority_is_an_error() {
        let cfg = config(MapConfig::new().set("general/priority", "loud"));
        assert!(matches!(
            cfg.priority_filter(None),
            Err(ConfigError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn max_backtrace_lines_degrades_to_zero() {
        assert_eq!(config(MapConfig::new()).max_backtrace_lines(), 0);
        let bad = config(MapConfig::new().set(PATH_MAX_BACKTRACE_LINES, "many"));
        assert_eq!(bad.max_backtrace_lines(), 0);
        let neg = config(MapConfig::new().set(PATH_MAX_BACKTRACE_LINES, "-3"));
        assert_eq!(neg.max_backtrace_lines(), 0);
        let ok = config(MapConfig::new().set(PATH_MAX_BACKTRACE_LINES, " 12 "));
        assert_eq!(ok.max_backtrace_lines(), 12);
    }

    #[test]
    fn blank_target_map_is_missing() {
        let cfg = config(MapConfig::new().set(PATH_TARGET_MAP, "   "));
        assert_eq!(cfg.target_map(), None);
    }

    #[test]
    fn retention_cutoff_subtracts_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let cfg = config(MapConfig::new().set(PATH_MAX_DAYS_TO_KEEP, "7"));
        assert_eq!(
            cfg.retention_cutoff(now).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap())
        );
        let keep_all = config(MapConfig::new().set(PATH_MAX_DAYS_TO_KEEP, "0"));
        assert_eq!(keep_all.retention_cutoff(now).unwrap(), None);
    }

    #[test]
    fn env_config_reads_prefixed_variables() {
        std::env::set_var("LOGTEST_GENERAL_TARGET_MAP", "[]");
        let cfg = EnvConfig::new("LOGTEST");
        assert_eq!(cfg.get("general/target_map").as_deref(), Some("[]"));
        assert_eq!(cfg.get("general/priority"), None);
    }
}
