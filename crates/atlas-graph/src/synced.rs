//! The mirror-on-write decorator around the local store.
//!
//! Local persistence is authoritative: a write only succeeds or fails on
//! the SQLite result. The Neo4j replay happens after a successful local
//! write and its failures are logged, never returned.

use std::sync::Arc;

use async_trait::async_trait;

use atlas_core::{Edge, Node};
use atlas_store::{AssetStore, GraphWriter, Result as StoreResult};

use crate::client::{GraphClient, GraphError};

/// How many rows go into one resync transaction.
const RESYNC_BATCH: usize = 500;

/// Wraps an [`AssetStore`], replaying every successful write to Neo4j.
#[derive(Clone)]
pub struct SyncedStore {
    store: Arc<AssetStore>,
    graph: GraphClient,
}

impl SyncedStore {
    pub fn new(store: Arc<AssetStore>, graph: GraphClient) -> Self {
        Self { store, graph }
    }

    /// Rebuild the mirror from scratch: clear it, recreate indexes, then
    /// batch-insert all nodes followed by all edges.
    pub async fn resync(&self) -> Result<(), GraphError> {
        let snapshot = self.store.export_graph().await?;

        self.graph.clear().await?;
        self.graph.create_indexes().await?;

        for chunk in snapshot.nodes.chunks(RESYNC_BATCH) {
            self.graph.mirror_nodes_batch(chunk).await?;
        }
        for chunk in snapshot.edges.chunks(RESYNC_BATCH) {
            self.graph.mirror_edges_batch(chunk).await?;
        }

        tracing::info!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "Mirror resynchronized"
        );
        Ok(())
    }
}

#[async_trait]
impl GraphWriter for SyncedStore {
    async fn upsert_node(&self, node: &Node) -> StoreResult<()> {
        self.store.upsert_node(node).await?;
        if let Err(e) = self.graph.mirror_node(node).await {
            tracing::warn!(node_id = %node.id, error = %e, "Mirror write failed");
        }
        Ok(())
    }

    async fn upsert_edge(&self, edge: &Edge) -> StoreResult<()> {
        self.store.upsert_edge(edge).await?;
        if let Err(e) = self.graph.mirror_edge(edge).await {
            tracing::warn!(edge_id = %edge.id, error = %e, "Mirror write failed");
        }
        Ok(())
    }

    async fn delete_node(&self, id: &str) -> StoreResult<bool> {
        let existed = self.store.delete_node(id).await?;
        if existed {
            if let Err(e) = self.graph.remove_node(id).await {
                tracing::warn!(node_id = %id, error = %e, "Mirror delete failed");
            }
        }
        Ok(existed)
    }
}
