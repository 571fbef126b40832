//! atlas-graph: Neo4j access for the Atlas asset graph.
//!
//! The local SQLite store is authoritative; this crate provides the
//! best-effort mirror ([`SyncedStore`]), the full resynchronization path,
//! and the Cypher path queries the remote traversal engine consumes.
//!
//! Labels: nodes are `Asset`, relationships are `EDGE` with a `type`
//! property carrying the edge type string.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod synced;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use synced::SyncedStore;
