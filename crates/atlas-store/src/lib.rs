//! atlas-store: SQLite persistence for the Atlas asset graph.
//!
//! [`AssetStore`] is the source of truth: nodes, edges, and scan history in
//! a single embedded database file (WAL mode, foreign keys with cascade).
//! Upserts are idempotent with respect to re-discovery, listing queries are
//! deterministically ordered, and [`AssetStore::build_adjacency`] feeds the
//! in-memory traversal engine.

pub mod error;
pub mod store;
pub mod writer;

pub use error::{Result, StoreError};
pub use store::{Adjacency, AssetStore, EdgeFilter, GraphSnapshot, NodeFilter};
pub use writer::GraphWriter;
