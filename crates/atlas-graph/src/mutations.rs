//! Mirror write operations against Neo4j.
//!
//! All mutations use MERGE (upsert) semantics so replaying a local write is
//! idempotent. Nodes merge on `Asset.id`; relationships merge on the
//! `(from, to, type)` triple, matching the local store's uniqueness rule.

use chrono::{DateTime, SecondsFormat, Utc};
use neo4rs::query;

use atlas_core::{Edge, Node};

use crate::client::{GraphClient, GraphError};

impl GraphClient {
    // ── Node mirror ──────────────────────────────────────────────

    /// Merge a node into the mirror; `first_seen` is only written on create.
    pub async fn mirror_node(&self, node: &Node) -> Result<(), GraphError> {
        let metadata = serde_json::to_string(&node.metadata).unwrap_or_default();

        let q = query(
            "MERGE (n:Asset {id: $id})
             ON CREATE SET n.first_seen = $first_seen
             SET n.name = $name, n.node_type = $node_type,
                 n.source = $source, n.source_file = $source_file,
                 n.provider = $provider, n.metadata = $metadata,
                 n.expires_at = $expires_at, n.last_seen = $last_seen",
        )
        .param("id", node.id.clone())
        .param("name", node.name.clone())
        .param("node_type", node.node_type.as_str().to_string())
        .param("source", node.source.clone())
        .param("source_file", node.source_file.clone())
        .param("provider", node.provider.clone())
        .param("metadata", metadata)
        .param("expires_at", opt_ts(&node.expires_at))
        .param("first_seen", ts(node.first_seen))
        .param("last_seen", ts(node.last_seen));

        self.run(q).await
    }

    /// Fetch a mirrored node by id.
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        let q = query("MATCH (n:Asset {id: $id}) RETURN n").param("id", id.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row
                    .get("n")
                    .map_err(|e| GraphError::Decode(e.to_string()))?;
                Ok(Some(crate::queries::decode_node(&node)?))
            }
            None => Ok(None),
        }
    }

    // ── Edge mirror ──────────────────────────────────────────────

    /// Merge an edge between two mirrored nodes matched by id.
    ///
    /// A silent no-op when either endpoint is missing from the mirror; the
    /// next resync repairs the gap.
    pub async fn mirror_edge(&self, edge: &Edge) -> Result<(), GraphError> {
        let metadata = serde_json::to_string(&edge.metadata).unwrap_or_default();

        let q = query(
            "MATCH (a:Asset {id: $from_id})
             MATCH (b:Asset {id: $to_id})
             MERGE (a)-[r:EDGE {type: $type}]->(b)
             SET r.id = $id, r.from_id = $from_id, r.to_id = $to_id,
                 r.metadata = $metadata",
        )
        .param("id", edge.id.clone())
        .param("from_id", edge.from_id.clone())
        .param("to_id", edge.to_id.clone())
        .param("type", edge.edge_type.as_str().to_string())
        .param("metadata", metadata);

        self.run(q).await
    }

    /// Detach-delete a mirrored node and its incident relationships.
    pub async fn remove_node(&self, id: &str) -> Result<(), GraphError> {
        let q = query("MATCH (n:Asset {id: $id}) DETACH DELETE n").param("id", id.to_string());
        self.run(q).await
    }

    // ── Resync support ───────────────────────────────────────────

    /// Remove every mirrored asset.
    pub async fn clear(&self) -> Result<(), GraphError> {
        self.run(query("MATCH (n:Asset) DETACH DELETE n")).await
    }

    /// (Re-)create the lookup indexes the path queries rely on.
    pub async fn create_indexes(&self) -> Result<(), GraphError> {
        self.run(query(
            "CREATE INDEX asset_id IF NOT EXISTS FOR (n:Asset) ON (n.id)",
        ))
        .await?;
        self.run(query(
            "CREATE INDEX edge_type IF NOT EXISTS FOR ()-[r:EDGE]-() ON (r.type)",
        ))
        .await
    }

    /// Merge a batch of nodes in a single transaction.
    pub async fn mirror_nodes_batch(&self, nodes: &[Node]) -> Result<(), GraphError> {
        let mut txn = self.start_txn().await?;

        for node in nodes {
            let metadata = serde_json::to_string(&node.metadata).unwrap_or_default();
            let q = query(
                "MERGE (n:Asset {id: $id})
                 SET n.name = $name, n.node_type = $node_type,
                     n.source = $source, n.source_file = $source_file,
                     n.provider = $provider, n.metadata = $metadata,
                     n.expires_at = $expires_at,
                     n.first_seen = $first_seen, n.last_seen = $last_seen",
            )
            .param("id", node.id.clone())
            .param("name", node.name.clone())
            .param("node_type", node.node_type.as_str().to_string())
            .param("source", node.source.clone())
            .param("source_file", node.source_file.clone())
            .param("provider", node.provider.clone())
            .param("metadata", metadata)
            .param("expires_at", opt_ts(&node.expires_at))
            .param("first_seen", ts(node.first_seen))
            .param("last_seen", ts(node.last_seen));

            txn.run(q).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Merge a batch of edges in a single transaction, matching endpoints
    /// by id.
    pub async fn mirror_edges_batch(&self, edges: &[Edge]) -> Result<(), GraphError> {
        let mut txn = self.start_txn().await?;

        for edge in edges {
            let metadata = serde_json::to_string(&edge.metadata).unwrap_or_default();
            let q = query(
                "MATCH (a:Asset {id: $from_id})
                 MATCH (b:Asset {id: $to_id})
                 MERGE (a)-[r:EDGE {type: $type}]->(b)
                 SET r.id = $id, r.from_id = $from_id, r.to_id = $to_id,
                     r.metadata = $metadata",
            )
            .param("id", edge.id.clone())
            .param("from_id", edge.from_id.clone())
            .param("to_id", edge.to_id.clone())
            .param("type", edge.edge_type.as_str().to_string())
            .param("metadata", metadata);

            txn.run(q).await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(dt: &Option<DateTime<Utc>>) -> String {
    dt.map(ts).unwrap_or_default()
}
