//! Error types for the atlas-certs crate.

use std::time::Duration;

use thiserror::Error;

/// TLS probe failures, returned to the caller.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("peer presented no certificates")]
    NoPeerCertificates,

    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum CertError {
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("store error: {0}")]
    Store(#[from] atlas_store::StoreError),
}

pub type Result<T> = std::result::Result<T, CertError>;
