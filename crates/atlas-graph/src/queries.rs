//! Cypher path queries backing the remote traversal engine.
//!
//! Each traversal is a single round trip. Record decoding is lenient for
//! string and timestamp properties (missing or malformed values become
//! empty strings or absences); an undecodable type column is an error,
//! which the engine recovers from by falling back to the local engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use neo4rs::query;

use atlas_core::{Edge, Node};

use crate::client::{GraphClient, GraphError};

/// One row of a variable-length path match: the far node plus how the
/// path reached it.
#[derive(Debug, Clone)]
pub struct PathRow {
    pub node: Node,
    pub depth: usize,
    /// Node ids from the traversal root to `node`, inclusive.
    pub path: Vec<String>,
    /// Edge type string of the hop adjacent to `node`.
    pub edge_type: String,
}

/// One step of a shortest-path result: a node and the relationship that
/// follows it (absent on the last step).
#[derive(Debug, Clone)]
pub struct PathStep {
    pub node: Node,
    pub edge: Option<Edge>,
}

impl GraphClient {
    /// All nodes with a directed path into `id`, with depth and the path
    /// taken. Multiple rows per node are possible (one per distinct path).
    pub async fn upstream_paths(&self, id: &str) -> Result<Vec<PathRow>, GraphError> {
        let q = query(
            "MATCH p = (n:Asset)-[:EDGE*1..]->(t:Asset {id: $id})
             WHERE n.id <> $id
             RETURN n, length(p) AS depth,
                    [x IN nodes(p) | x.id] AS path,
                    relationships(p)[0].type AS edge_type
             ORDER BY depth",
        )
        .param("id", id.to_string());

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row
                .get("n")
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            let depth: i64 = row.get("depth").unwrap_or_default();
            // nodes(p) runs far-node-first; flip to root-first.
            let mut path: Vec<String> = row.get("path").unwrap_or_default();
            path.reverse();
            let edge_type: String = row.get("edge_type").unwrap_or_default();

            results.push(PathRow {
                node: decode_node(&node)?,
                depth: depth.max(0) as usize,
                path,
                edge_type,
            });
        }
        Ok(results)
    }

    /// All nodes reachable downstream from `id` within `max_depth` hops.
    pub async fn downstream_paths(
        &self,
        id: &str,
        max_depth: usize,
    ) -> Result<Vec<PathRow>, GraphError> {
        let cypher = format!(
            "MATCH p = (s:Asset {{id: $id}})-[:EDGE*1..{max_depth}]->(n:Asset)
             WHERE n.id <> $id
             RETURN n, length(p) AS depth,
                    [x IN nodes(p) | x.id] AS path,
                    relationships(p)[length(p) - 1].type AS edge_type
             ORDER BY depth"
        );
        let q = query(&cypher).param("id", id.to_string());

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row
                .get("n")
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            let depth: i64 = row.get("depth").unwrap_or_default();
            let path: Vec<String> = row.get("path").unwrap_or_default();
            let edge_type: String = row.get("edge_type").unwrap_or_default();

            results.push(PathRow {
                node: decode_node(&node)?,
                depth: depth.max(0) as usize,
                path,
                edge_type,
            });
        }
        Ok(results)
    }

    /// Undirected shortest path between two ids as an ordered step list.
    /// Empty when the nodes are disconnected.
    pub async fn shortest_path_steps(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> Result<Vec<PathStep>, GraphError> {
        let q = query(
            "MATCH p = shortestPath(
               (a:Asset {id: $from})-[:EDGE*]-(b:Asset {id: $to})
             )
             UNWIND range(0, size(nodes(p)) - 1) AS i
             RETURN nodes(p)[i] AS n,
                    CASE WHEN i < size(relationships(p))
                         THEN relationships(p)[i] ELSE null END AS r",
        )
        .param("from", from_id.to_string())
        .param("to", to_id.to_string());

        let rows = self.query_rows(q).await?;
        let mut steps = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row
                .get("n")
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            let edge = row
                .get::<neo4rs::Relation>("r")
                .ok()
                .map(|r| decode_relation(&r));

            steps.push(PathStep {
                node: decode_node(&node)?,
                edge,
            });
        }
        Ok(steps)
    }

    /// Distinct direct neighbors of `id`, in either direction.
    pub async fn neighbor_nodes(&self, id: &str) -> Result<Vec<Node>, GraphError> {
        let q = query(
            "MATCH (a:Asset {id: $id})-[:EDGE]-(b:Asset)
             RETURN DISTINCT b",
        )
        .param("id", id.to_string());

        let rows = self.query_rows(q).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row
                .get("b")
                .map_err(|e| GraphError::Decode(e.to_string()))?;
            nodes.push(decode_node(&node)?);
        }
        Ok(nodes)
    }
}

/// Convert a mirrored `Asset` node back into the domain type.
///
/// Strings default to empty, timestamps to epoch/absent; only an
/// unparseable `node_type` is a hard decode error.
pub(crate) fn decode_node(node: &neo4rs::Node) -> Result<Node, GraphError> {
    let type_str: String = node.get("node_type").unwrap_or_default();
    let node_type = type_str
        .parse()
        .map_err(|_| GraphError::Decode(format!("bad node_type {type_str:?}")))?;

    let metadata: BTreeMap<String, String> = node
        .get::<String>("metadata")
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(Node {
        id: node.get("id").unwrap_or_default(),
        name: node.get("name").unwrap_or_default(),
        node_type,
        source: node.get("source").unwrap_or_default(),
        source_file: node.get("source_file").unwrap_or_default(),
        provider: node.get("provider").unwrap_or_default(),
        metadata,
        expires_at: parse_opt_ts(node.get::<String>("expires_at").ok()),
        first_seen: parse_ts(node.get::<String>("first_seen").ok()),
        last_seen: parse_ts(node.get::<String>("last_seen").ok()),
    })
}

/// Convert a mirrored `EDGE` relationship back into the domain type using
/// the properties the mirror writes alongside it.
pub(crate) fn decode_relation(rel: &neo4rs::Relation) -> Edge {
    let metadata: BTreeMap<String, String> = rel
        .get::<String>("metadata")
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    let type_str: String = rel.get("type").unwrap_or_default();
    let edge_type = type_str.parse().unwrap_or(atlas_core::EdgeType::DependsOn);

    Edge {
        id: rel.get("id").unwrap_or_default(),
        from_id: rel.get("from_id").unwrap_or_default(),
        to_id: rel.get("to_id").unwrap_or_default(),
        edge_type,
        metadata,
    }
}

fn parse_ts(s: Option<String>) -> DateTime<Utc> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}
