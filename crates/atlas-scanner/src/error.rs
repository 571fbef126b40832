//! Error types for the atlas-scanner crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("unknown scan source: {0}")]
    UnknownSource(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(#[from] atlas_store::StoreError),

    #[error("scan cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(#[from] atlas_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
