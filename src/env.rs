/// Environment variable names used by [`EnvConfig`] so services can
/// configure logging without a config file.
///
/// A config path such as `general/max_backtrace_lines` is looked up as
/// `LOGGER_GENERAL_MAX_BACKTRACE_LINES`.
///
/// [`EnvConfig`]: crate::config::EnvConfig

/// Default prefix prepended to every config path.
pub const LOGGER_ENV_PREFIX: &str = "LOGGER";

/// Global minimum priority, e.g. `LOGGER_GENERAL_PRIORITY=3`.
pub const LOGGER_PRIORITY_ENV: &str = "LOGGER_GENERAL_PRIORITY";

/// Maximum number of backtrace lines recorded per event.
pub const LOGGER_MAX_BACKTRACE_LINES_ENV: &str = "LOGGER_GENERAL_MAX_BACKTRACE_LINES";

/// JSON target map, see [`crate::router::TargetRules`].
pub const LOGGER_TARGET_MAP_ENV: &str = "LOGGER_GENERAL_TARGET_MAP";

/// Days the database sink keeps rows before the cleanup job removes them.
pub const LOGGER_MAX_DAYS_TO_KEEP_ENV: &str = "LOGGER_DB_MAX_DAYS_TO_KEEP";

/// Build the variable name for `path` under `prefix`.
pub fn env_key(prefix: &str, path: &str) -> String {
    let path: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_{}", prefix, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_matches_documented_names() {
        assert_eq!(env_key(LOGGER_ENV_PREFIX, "general/priority"), LOGGER_PRIORITY_ENV);
        assert_eq!(
            env_key(LOGGER_ENV_PREFIX, "general/max_backtrace_lines"),
            LOGGER_MAX_BACKTRACE_LINES_ENV
        );
        assert_eq!(env_key(LOGGER_ENV_PREFIX, "db/max_days_to_keep"), LOGGER_MAX_DAYS_TO_KEEP_ENV);
    }
}
