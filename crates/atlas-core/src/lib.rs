//! atlas-core: Shared types, configuration, and error handling for Atlas.
//!
//! This crate provides the foundational types used across all Atlas components:
//! - Node and Edge types for the asset dependency graph
//! - Scan history records
//! - Alert event types for certificate and impact notifications
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::Settings;
pub use error::ConfigError;
pub use events::{AlertAsset, AlertEvent, AlertImpact, AlertSeverity};
pub use types::{Edge, EdgeType, Node, NodeType, Scan, ScanStatus};
