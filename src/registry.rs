use crate::config::LoggerConfig;
use crate::error::ConfigError;
use crate::record::Severity;
use crate::sink::LogSink;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A sink registered under a target name, with its optional priority filter.
#[derive(Clone)]
pub struct Target {
    pub sink: Arc<dyn LogSink>,
    /// Highest numeric priority (least severe) this target accepts.
    pub max_priority: Option<i64>,
}

impl Target {
    pub fn accepts(&self, severity: Severity) -> bool {
        self.max_priority.map_or(true, |max| severity.priority() <= max)
    }
}

/// Named sinks that routing rules can point at.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    targets: BTreeMap<String, Target>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` under `name` without a priority filter.
    pub fn register(&mut self, name: impl Into<String>, sink: Arc<dyn LogSink>) -> &mut Self {
        self.targets.insert(name.into(), Target { sink, max_priority: None });
        self
    }

    /// Register `sink` under `name` with the priority filter configured at
    /// `<name>/priority`, falling back to the global priority.
    pub fn register_configured(
        &mut self,
        name: impl Into<String>,
        sink: Arc<dyn LogSink>,
        config: &LoggerConfig,
    ) -> Result<&mut Self, ConfigError> {
        let name = name.into();
        let max_priority = config.priority_filter(Some(&format!("{}/priority", name)))?;
        self.targets.insert(name, Target { sink, max_priority });
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Target)> {
        self.targets.iter().map(|(name, target)| (name.as_str(), target))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::noop_sink::NoopSink;

    #[test]
    fn configured_filter_drops_less_severe_events() {
        let config = LoggerConfig::new(Arc::new(
            MapConfig::new().set("general/priority", "6").set("db/priority", "3"),
        ));
        let mut registry = SinkRegistry::new();
        registry
            .register_configured("db", Arc::new(NoopSink), &config)
            .unwrap()
            .register_configured("file", Arc::new(NoopSink), &config)
            .unwrap();

        let db = registry.get("db").unwrap();
        assert!(db.accepts(Severity::Err));
        assert!(!db.accepts(Severity::Warn));

        let file = registry.get("file").unwrap();
        assert!(file.accepts(Severity::Info));
        assert!(!file.accepts(Severity::Debug));
    }

    #[test]
    fn warn_threshold_accepts_everything() {
        let config = LoggerConfig::new(Arc::new(MapConfig::new().set("general/priority", "4")));
        let mut registry = SinkRegistry::new();
        registry.register_configured("db", Arc::new(NoopSink), &config).unwrap();
        assert!(registry.get("db").unwrap().accepts(Severity::Debug));
    }

    #[test]
    fn iterates_in_name_order() {
        let mut registry = SinkRegistry::new();
        registry.register("b", Arc::new(NoopSink)).register("a", Arc::new(NoopSink));
        let names: Vec<_> = registry.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }
}
