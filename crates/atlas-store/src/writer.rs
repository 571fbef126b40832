//! The write seam between the scanner and the graph store.
//!
//! [`AssetStore`](crate::AssetStore) implements this directly; the Neo4j
//! `SyncedStore` decorator implements it by writing locally first and then
//! mirroring best-effort.

use async_trait::async_trait;

use atlas_core::{Edge, Node};

use crate::error::Result;

/// Write operations the scan pipeline performs against the graph.
#[async_trait]
pub trait GraphWriter: Send + Sync {
    /// Insert or update a node; `first_seen` is preserved on update.
    async fn upsert_node(&self, node: &Node) -> Result<()>;

    /// Insert an edge, or update its metadata when the
    /// `(from_id, to_id, type)` triple already exists.
    async fn upsert_edge(&self, edge: &Edge) -> Result<()>;

    /// Delete a node and all incident edges. Returns whether it existed.
    async fn delete_node(&self, id: &str) -> Result<bool>;
}
