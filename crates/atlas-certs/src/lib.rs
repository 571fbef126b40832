//! atlas-certs: TLS certificate lifecycle tracking.
//!
//! Certificates enter the graph two ways: discovered by parsers, or probed
//! directly from endpoints the graph already knows about (ingress hosts,
//! load balancer addresses, DNS names). This crate classifies them by
//! remaining lifetime and extracts leaf metadata from live endpoints.

pub mod error;
pub mod probe;
pub mod status;
pub mod tracker;

pub use error::{CertError, ProbeError};
pub use probe::{probe, probe_and_store, CertInfo};
pub use status::{classify_days, days_until, CertStatus};
pub use tracker::{discover_endpoints, expiring_certs, list_certs, CertRecord};
