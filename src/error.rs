/// Error raised when a configuration value exists but cannot be read as
/// the expected type.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config value at `{path}` is not a valid integer: {value:?}")]
    InvalidInteger { path: String, value: String },
}

/// Error raised when the serialized target map cannot be parsed.
#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("malformed target map: {0}")]
    Deserialize(#[from] serde_json::Error),
}
