//! Neo4j-backed traversal engine with transparent local fallback.
//!
//! Each traversal is one Cypher round trip. Any remote failure — connect,
//! query, record decode — delegates the same call to the injected
//! [`LocalEngine`], so callers never observe remote errors; a missing
//! node surfaces as the local engine's own not-found error.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use atlas_core::{EdgeType, Node};
use atlas_graph::client::{GraphClient, GraphConfig, GraphError};
use atlas_graph::queries::{PathRow, PathStep};

use crate::error::{EngineError, Result};
use crate::local::LocalEngine;
use crate::types::{AffectedNode, BlastRadius, DependencyChain, GraphPath, ImpactTree};
use crate::{clamp_chain_depth, GraphEngine};

/// The query surface the remote engine needs from a graph database.
///
/// [`GraphClient`] is the production implementation; tests substitute a
/// stub that always fails to exercise the fallback path.
#[async_trait]
pub trait RemoteGraph: Send + Sync {
    async fn fetch_node(&self, id: &str) -> std::result::Result<Option<Node>, GraphError>;

    async fn upstream_paths(&self, id: &str) -> std::result::Result<Vec<PathRow>, GraphError>;

    async fn downstream_paths(
        &self,
        id: &str,
        max_depth: usize,
    ) -> std::result::Result<Vec<PathRow>, GraphError>;

    async fn shortest_path_steps(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> std::result::Result<Vec<PathStep>, GraphError>;

    async fn neighbor_nodes(&self, id: &str) -> std::result::Result<Vec<Node>, GraphError>;
}

#[async_trait]
impl RemoteGraph for GraphClient {
    async fn fetch_node(&self, id: &str) -> std::result::Result<Option<Node>, GraphError> {
        self.get_node(id).await
    }

    async fn upstream_paths(&self, id: &str) -> std::result::Result<Vec<PathRow>, GraphError> {
        GraphClient::upstream_paths(self, id).await
    }

    async fn downstream_paths(
        &self,
        id: &str,
        max_depth: usize,
    ) -> std::result::Result<Vec<PathRow>, GraphError> {
        GraphClient::downstream_paths(self, id, max_depth).await
    }

    async fn shortest_path_steps(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> std::result::Result<Vec<PathStep>, GraphError> {
        GraphClient::shortest_path_steps(self, from_id, to_id).await
    }

    async fn neighbor_nodes(&self, id: &str) -> std::result::Result<Vec<Node>, GraphError> {
        GraphClient::neighbor_nodes(self, id).await
    }
}

/// Traversal engine backed by a remote graph database, with an injected
/// local engine as the safety net.
pub struct RemoteEngine<R = GraphClient> {
    remote: R,
    fallback: LocalEngine,
}

impl RemoteEngine<GraphClient> {
    /// Connect to Neo4j (bounded reachability check included) and pair the
    /// remote engine with its local fallback.
    pub async fn connect(config: &GraphConfig, fallback: LocalEngine) -> Result<Self> {
        let client = GraphClient::connect(config).await?;
        Ok(Self {
            remote: client,
            fallback,
        })
    }
}

impl<R: RemoteGraph> RemoteEngine<R> {
    pub fn new(remote: R, fallback: LocalEngine) -> Self {
        Self { remote, fallback }
    }

    async fn blast_radius_remote(&self, node_id: &str) -> std::result::Result<BlastRadius, GraphError> {
        // Distinguish "no dependents" from "node missing in the mirror".
        if self.remote.fetch_node(node_id).await?.is_none() {
            return Err(GraphError::Decode(format!("node {node_id} not mirrored")));
        }

        let rows = self.remote.upstream_paths(node_id).await?;
        let affected = dedup_first_visit(rows);

        Ok(BlastRadius {
            root_id: node_id.to_string(),
            total_affected: affected.len(),
            affected,
        })
    }

    async fn blast_radius_tree_remote(
        &self,
        node_id: &str,
    ) -> std::result::Result<ImpactTree, GraphError> {
        let root = self
            .remote
            .fetch_node(node_id)
            .await?
            .ok_or_else(|| GraphError::Decode(format!("node {node_id} not mirrored")))?;

        let rows = self.remote.upstream_paths(node_id).await?;

        // Shortest paths first, then first-visit assignment of each node to
        // the parent that reached it.
        let mut nodes: HashMap<String, Node> = HashMap::new();
        nodes.insert(root.id.clone(), root.clone());
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(node_id.to_string());

        for row in rows {
            nodes.entry(row.node.id.clone()).or_insert(row.node.clone());
            if seen.contains(&row.node.id) {
                continue;
            }
            seen.insert(row.node.id.clone());

            // The parent is the second-to-last id along the root-first path.
            let parent = row
                .path
                .len()
                .checked_sub(2)
                .and_then(|i| row.path.get(i))
                .cloned()
                .unwrap_or_else(|| node_id.to_string());
            children_of
                .entry(parent)
                .or_default()
                .push(row.node.id.clone());
        }

        Ok(build_tree(&nodes, &children_of, root))
    }

    async fn dependency_chain_remote(
        &self,
        node_id: &str,
        max_depth: usize,
    ) -> std::result::Result<DependencyChain, GraphError> {
        if self.remote.fetch_node(node_id).await?.is_none() {
            return Err(GraphError::Decode(format!("node {node_id} not mirrored")));
        }

        let nodes = if max_depth == 0 {
            Vec::new()
        } else {
            dedup_first_visit(self.remote.downstream_paths(node_id, max_depth).await?)
        };

        Ok(DependencyChain {
            root_id: node_id.to_string(),
            max_depth,
            total: nodes.len(),
            nodes,
        })
    }

    async fn shortest_path_remote(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> std::result::Result<GraphPath, EngineError> {
        let from = self
            .remote
            .fetch_node(from_id)
            .await?
            .ok_or_else(|| GraphError::Decode(format!("node {from_id} not mirrored")))?;
        if self.remote.fetch_node(to_id).await?.is_none() {
            return Err(GraphError::Decode(format!("node {to_id} not mirrored")).into());
        }

        if from_id == to_id {
            return Ok(GraphPath {
                nodes: vec![from],
                edges: vec![],
            });
        }

        let steps = self.remote.shortest_path_steps(from_id, to_id).await?;
        if steps.is_empty() {
            // Both endpoints are mirrored, so an empty result means the
            // nodes really are disconnected.
            return Err(EngineError::NoPath {
                from: from_id.to_string(),
                to: to_id.to_string(),
            });
        }

        let mut nodes = Vec::with_capacity(steps.len());
        let mut edges = Vec::new();
        for step in steps {
            nodes.push(step.node);
            if let Some(edge) = step.edge {
                edges.push(edge);
            }
        }
        Ok(GraphPath { nodes, edges })
    }

    async fn neighbors_remote(&self, node_id: &str) -> std::result::Result<Vec<Node>, GraphError> {
        if self.remote.fetch_node(node_id).await?.is_none() {
            return Err(GraphError::Decode(format!("node {node_id} not mirrored")));
        }

        let mut nodes = self.remote.neighbor_nodes(node_id).await?;
        nodes.sort_by(|a, b| {
            a.node_type
                .cmp(&b.node_type)
                .then_with(|| a.name.cmp(&b.name))
        });
        nodes.dedup_by(|a, b| a.id == b.id);
        Ok(nodes)
    }
}

#[async_trait]
impl<R: RemoteGraph> GraphEngine for RemoteEngine<R> {
    async fn blast_radius(&self, node_id: &str) -> Result<BlastRadius> {
        match self.blast_radius_remote(node_id).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "Remote blast radius failed, using local engine");
                self.fallback.blast_radius(node_id).await
            }
        }
    }

    async fn blast_radius_tree(&self, node_id: &str) -> Result<ImpactTree> {
        match self.blast_radius_tree_remote(node_id).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "Remote impact tree failed, using local engine");
                self.fallback.blast_radius_tree(node_id).await
            }
        }
    }

    async fn neighbors(&self, node_id: &str) -> Result<Vec<Node>> {
        match self.neighbors_remote(node_id).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "Remote neighbors failed, using local engine");
                self.fallback.neighbors(node_id).await
            }
        }
    }

    async fn shortest_path(&self, from_id: &str, to_id: &str) -> Result<GraphPath> {
        match self.shortest_path_remote(from_id, to_id).await {
            Ok(result) => Ok(result),
            // A domain no-path answer is a result, not a remote failure.
            Err(EngineError::NoPath { from, to }) => Err(EngineError::NoPath { from, to }),
            Err(e) => {
                tracing::warn!(from = %from_id, to = %to_id, error = %e, "Remote shortest path failed, using local engine");
                self.fallback.shortest_path(from_id, to_id).await
            }
        }
    }

    async fn dependency_chain(
        &self,
        node_id: &str,
        max_depth: usize,
    ) -> Result<DependencyChain> {
        let max_depth = clamp_chain_depth(max_depth);
        match self.dependency_chain_remote(node_id, max_depth).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(node_id = %node_id, error = %e, "Remote dependency chain failed, using local engine");
                self.fallback.dependency_chain(node_id, max_depth).await
            }
        }
    }

    async fn close(&self) {
        self.fallback.close().await;
    }
}

/// Collapse multi-path rows into one entry per node, keeping the first
/// (shortest, the rows arrive depth-ordered) appearance.
fn dedup_first_visit(rows: Vec<PathRow>) -> Vec<AffectedNode> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        if seen.contains(&row.node.id) {
            continue;
        }
        seen.insert(row.node.id.clone());
        out.push(AffectedNode {
            depth: row.depth,
            edge_type: row
                .edge_type
                .parse::<EdgeType>()
                .unwrap_or(EdgeType::DependsOn),
            path: row.path,
            node: row.node,
        });
    }

    out
}

fn build_tree(
    nodes: &HashMap<String, Node>,
    children_of: &HashMap<String, Vec<String>>,
    node: Node,
) -> ImpactTree {
    let children = children_of
        .get(&node.id)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| nodes.get(id).cloned())
                .map(|child| build_tree(nodes, children_of, child))
                .collect()
        })
        .unwrap_or_default();

    ImpactTree { node, children }
}
