use crate::config::LoggerConfig;
use crate::error::RouteError;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Target names mapped to whether that target wants a backtrace.
pub type MappedTargets = BTreeMap<String, bool>;

/// One entry of the serialized target map.
///
/// `backtrace` and `stop_on_match` accept booleans, integers or numeric
/// strings; anything non-zero is `true`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetRule {
    pub pattern: String,
    pub target: String,
    #[serde(default, rename = "backtrace", deserialize_with = "flag")]
    pub backtrace_enabled: bool,
    #[serde(default, deserialize_with = "flag")]
    pub stop_on_match: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => false,
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        Some(Flag::Float(n)) => n as i64 != 0,
        Some(Flag::Text(s)) => s.trim().parse::<i64>().map(|n| n != 0).unwrap_or(false),
    })
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: TargetRule,
    // `None` when the pattern does not compile; such a rule never matches.
    regex: Option<Regex>,
}

/// Ordered, parsed rule set. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct TargetRules {
    rules: Vec<CompiledRule>,
}

impl TargetRules {
    pub fn new(rules: Vec<TargetRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let anchored = format!("^(?:{})$", rule.pattern);
                let regex = match Regex::new(&anchored) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(
                            pattern = %rule.pattern,
                            target_name = %rule.target,
                            error = %e,
                            "target pattern does not compile, rule will never match"
                        );
                        None
                    }
                };
                CompiledRule { rule, regex }
            })
            .collect();
        TargetRules { rules }
    }

    /// Parse the JSON target map.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let rules: Vec<TargetRule> = serde_json::from_str(raw)?;
        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule in order against the whole of `filename`.
    ///
    /// A later match for the same target overwrites the earlier flag.
    /// Iteration ends at the first matching rule with `stop_on_match`.
    pub fn route(&self, filename: &str) -> MappedTargets {
        let mut targets = MappedTargets::new();
        for compiled in &self.rules {
            let matched = compiled
                .regex
                .as_ref()
                .map(|re| re.is_match(filename))
                .unwrap_or(false);
            if !matched {
                continue;
            }
            targets.insert(compiled.rule.target.clone(), compiled.rule.backtrace_enabled);
            if compiled.rule.stop_on_match {
                break;
            }
        }
        targets
    }
}

/// Resolves target names for a call-site file.
///
/// The target map is read and parsed on first use only; every later call
/// reuses the cached result, including a missing or malformed map. A map
/// without rules counts as missing.
pub struct Router {
    config: LoggerConfig,
    rules: OnceLock<Option<TargetRules>>,
}

impl Router {
    pub fn new(config: LoggerConfig) -> Self {
        Router { config, rules: OnceLock::new() }
    }

    /// Router with an already-parsed rule set.
    pub fn with_rules(config: LoggerConfig, rules: TargetRules) -> Self {
        let router = Self::new(config);
        let _ = router.rules.set(Some(rules).filter(|r| !r.is_empty()));
        router
    }

    fn rules(&self) -> Option<&TargetRules> {
        self.rules
            .get_or_init(|| {
                let raw = self.config.target_map()?;
                match TargetRules::parse(&raw) {
                    Ok(rules) if rules.is_empty() => None,
                    Ok(rules) => {
                        tracing::debug!(rules = rules.len(), "loaded target map");
                        Some(rules)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring target map");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Targets for `filename`, or `None` when no target map is configured
    /// or it could not be parsed.
    pub fn route(&self, filename: &str) -> Option<MappedTargets> {
        self.rules().map(|rules| rules.route(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigProvider, MapConfig, PATH_TARGET_MAP};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rule(pattern: &str, target: &str, backtrace: bool, stop: bool) -> TargetRule {
        TargetRule {
            pattern: pattern.into(),
            target: target.into(),
            backtrace_enabled: backtrace,
            stop_on_match: stop,
        }
    }

    fn router(raw: Option<&str>) -> Router {
        let mut map = MapConfig::new();
        if let Some(raw) = raw {
            map = map.set(PATH_TARGET_MAP, raw);
        }
        Router::new(LoggerConfig::new(Arc::new(map)))
    }

    struct CountingConfig {
        reads: AtomicUsize,
        raw: String,
    }

    impl ConfigProvider for CountingConfig {
        fn get(&self, path: &str) -> Option<String> {
            if path == PATH_TARGET_MAP {
                self.reads.fetch_add(1, Ordering::SeqCst);
                Some(self.raw.clone())
            } else {
                None
            }
        }
    }

    #[test]
    fn stop_on_match_skips_later_rules() {
        let rules = TargetRules::new(vec![
            rule("app/.*", "A", false, false),
            rule(".*/payment/.*", "B", true, true),
            rule(".*\\.rs", "C", false, false),
        ]);
        let targets = rules.route("app/payment/gateway.rs");
        let expected: MappedTargets =
            [("A".to_string(), false), ("B".to_string(), true)].into_iter().collect();
        assert_eq!(targets, expected);
    }

    #[test]
    fn patterns_match_the_whole_filename() {
        let rules = TargetRules::new(vec![rule("app", "A", false, false)]);
        assert!(rules.route("app/x.rs").is_empty());
        assert!(rules.route("myapp").is_empty());
        assert_eq!(rules.route("app").len(), 1);

        let alternation = TargetRules::new(vec![rule("a|b", "A", false, false)]);
        assert!(alternation.route("ab").is_empty());
        assert_eq!(alternation.route("b").len(), 1);
    }

    #[test]
    fn later_match_overwrites_flag_for_same_target() {
        let rules = TargetRules::new(vec![
            rule(".*", "db", true, false),
            rule("lib/.*", "db", false, false),
        ]);
        assert_eq!(rules.route("lib/x.rs").get("db"), Some(&false));
    }

    #[test]
    fn invalid_pattern_is_a_non_match() {
        let rules = TargetRules::new(vec![
            rule("(unclosed", "broken", true, true),
            rule(".*", "file", false, false),
        ]);
        let targets = rules.route("(unclosed");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets.get("file"), Some(&false));
    }

    #[test]
    fn no_match_is_empty_but_no_map_is_none() {
        let configured = router(Some(r#"[{"pattern":"lib/.*","target":"db"}]"#));
        assert_eq!(configured.route("app/x.rs"), Some(MappedTargets::new()));
        assert_eq!(router(None).route("app/x.rs"), None);
    }

    #[test]
    fn empty_map_behaves_like_no_map() {
        assert_eq!(router(Some("[]")).route("app/x.rs"), None);
        let config = LoggerConfig::new(Arc::new(MapConfig::new()));
        let prebuilt = Router::with_rules(config, TargetRules::new(Vec::new()));
        assert_eq!(prebuilt.route("app/x.rs"), None);
    }

    #[test]
    fn malformed_map_behaves_like_no_map() {
        assert_eq!(router(Some("a:1:{garbage")).route("app/x.rs"), None);
        assert_eq!(router(Some(r#"{"pattern":".*"}"#)).route("app/x.rs"), None);
    }

    #[test]
    fn flags_accept_numbers_and_strings() {
        let rules: Vec<TargetRule> = serde_json::from_str(
            r#"[
                {"pattern":"a","target":"t1","backtrace":"1","stop_on_match":0},
                {"pattern":"b","target":"t2","backtrace":true,"stop_on_match":"0"},
                {"pattern":"c","target":"t3","backtrace":2}
            ]"#,
        )
        .unwrap();
        assert_eq!(rules[0], rule("a", "t1", true, false));
        assert_eq!(rules[1], rule("b", "t2", true, false));
        assert_eq!(rules[2], rule("c", "t3", true, false));
    }

    #[test]
    fn target_map_is_parsed_once() {
        let provider = Arc::new(CountingConfig {
            reads: AtomicUsize::new(0),
            raw: r#"[{"pattern":".*","target":"db","backtrace":1}]"#.into(),
        });
        let router = Router::new(LoggerConfig::new(provider.clone()));
        let first = router.route("app/x.rs");
        let second = router.route("lib/y.rs");
        assert_eq!(first, second);
        assert_eq!(first.unwrap().get("db"), Some(&true));
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_parses_once() {
        let provider = Arc::new(CountingConfig {
            reads: AtomicUsize::new(0),
            raw: r#"[{"pattern":".*","target":"db"}]"#.into(),
        });
        let router = Arc::new(Router::new(LoggerConfig::new(provider.clone())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || router.route("x.rs"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().len(), 1);
        }
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);
    }
}
