//! Error types for gateway-rs

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error types
///
/// Everything here is a startup-time failure except `Http`, which the proxy
/// turns into a 500 response instead of propagating.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two routes in the table share the same path
    #[error("Duplicate route path: {path}")]
    DuplicateRoute { path: String },

    /// A route that cannot be served as declared
    #[error("Invalid route {path}: {reason}")]
    InvalidRoute { path: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::Config(format!("Failed to parse routes file: {}", err))
    }
}
