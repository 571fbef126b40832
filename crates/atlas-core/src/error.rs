use thiserror::Error;

/// Construction-time configuration failures.
///
/// Raised when settings cannot be loaded or a component is constructed
/// with invalid parameters (bad interval, unknown source, malformed URI).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid interval {value:?}: {reason}")]
    InvalidInterval { value: String, reason: String },

    #[error("unknown scan source: {0}")]
    UnknownSource(String),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}
