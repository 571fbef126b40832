//! In-memory traversal engine over the local store.
//!
//! Every query begins with a single adjacency build plus one full node
//! read; BFS runs over the materialized maps with a first-visited set, so
//! cycles terminate without parent bookkeeping. Graphs here are small and
//! finite, so no depth cap is applied to blast radius.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;

use atlas_core::{Edge, Node};
use atlas_store::{Adjacency, AssetStore, NodeFilter};

use crate::error::{EngineError, Result};
use crate::types::{AffectedNode, BlastRadius, DependencyChain, GraphPath, ImpactTree};
use crate::{clamp_chain_depth, GraphEngine};

/// Stateless BFS engine; rebuilds adjacency from the store per query.
#[derive(Clone)]
pub struct LocalEngine {
    store: Arc<AssetStore>,
}

/// One consistent in-memory view of the graph for a single query.
struct GraphView {
    nodes: HashMap<String, Node>,
    adjacency: Adjacency,
}

impl GraphView {
    fn require(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.to_string()))
    }

    fn upstream(&self, id: &str) -> &[Edge] {
        self.adjacency
            .upstream
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn downstream(&self, id: &str) -> &[Edge] {
        self.adjacency
            .downstream
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl LocalEngine {
    pub fn new(store: Arc<AssetStore>) -> Self {
        Self { store }
    }

    async fn load(&self) -> Result<GraphView> {
        let nodes = self
            .store
            .list_nodes(&NodeFilter::default())
            .await?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let adjacency = self.store.build_adjacency().await?;
        Ok(GraphView { nodes, adjacency })
    }
}

#[async_trait]
impl GraphEngine for LocalEngine {
    async fn blast_radius(&self, node_id: &str) -> Result<BlastRadius> {
        let view = self.load().await?;
        view.require(node_id)?;

        let mut affected = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node_id.to_string());

        // BFS queue: (node id, depth, path from root inclusive).
        let mut queue: VecDeque<(String, usize, Vec<String>)> = VecDeque::new();
        queue.push_back((node_id.to_string(), 0, vec![node_id.to_string()]));

        while let Some((current, depth, path)) = queue.pop_front() {
            for edge in view.upstream(&current) {
                let dependent = &edge.from_id;
                if visited.contains(dependent) {
                    continue;
                }
                visited.insert(dependent.clone());

                let mut next_path = path.clone();
                next_path.push(dependent.clone());

                if let Some(node) = view.nodes.get(dependent) {
                    affected.push(AffectedNode {
                        node: node.clone(),
                        depth: depth + 1,
                        edge_type: edge.edge_type,
                        path: next_path.clone(),
                    });
                }

                queue.push_back((dependent.clone(), depth + 1, next_path));
            }
        }

        Ok(BlastRadius {
            root_id: node_id.to_string(),
            total_affected: affected.len(),
            affected,
        })
    }

    async fn blast_radius_tree(&self, node_id: &str) -> Result<ImpactTree> {
        let view = self.load().await?;
        let root = view.require(node_id)?.clone();

        // First-visit BFS assigning each upstream node to exactly one parent.
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node_id.to_string());

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(node_id.to_string());

        while let Some(current) = queue.pop_front() {
            for edge in view.upstream(&current) {
                let dependent = &edge.from_id;
                if visited.contains(dependent) {
                    continue;
                }
                visited.insert(dependent.clone());
                children_of
                    .entry(current.clone())
                    .or_default()
                    .push(dependent.clone());
                queue.push_back(dependent.clone());
            }
        }

        Ok(assemble_tree(&view.nodes, &children_of, root))
    }

    async fn neighbors(&self, node_id: &str) -> Result<Vec<Node>> {
        if self.store.get_node(node_id).await?.is_none() {
            return Err(EngineError::NodeNotFound(node_id.to_string()));
        }
        Ok(self.store.get_neighbors(node_id).await?)
    }

    async fn shortest_path(&self, from_id: &str, to_id: &str) -> Result<GraphPath> {
        let view = self.load().await?;
        let from = view.require(from_id)?.clone();
        view.require(to_id)?;

        if from_id == to_id {
            return Ok(GraphPath {
                nodes: vec![from],
                edges: vec![],
            });
        }

        // Undirected BFS over the combined neighbor map, keeping the edge
        // that first reached each node for path reconstruction.
        let mut prev: HashMap<String, (String, Edge)> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from_id.to_string());

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(from_id.to_string());

        'search: while let Some(current) = queue.pop_front() {
            let forward = view.downstream(&current).iter().map(|e| (&e.to_id, e));
            let backward = view.upstream(&current).iter().map(|e| (&e.from_id, e));

            for (neighbor, edge) in forward.chain(backward) {
                if visited.contains(neighbor) {
                    continue;
                }
                visited.insert(neighbor.clone());
                prev.insert(neighbor.clone(), (current.clone(), edge.clone()));
                if neighbor == to_id {
                    break 'search;
                }
                queue.push_back(neighbor.clone());
            }
        }

        if !prev.contains_key(to_id) {
            return Err(EngineError::NoPath {
                from: from_id.to_string(),
                to: to_id.to_string(),
            });
        }

        // Walk back from the target.
        let mut ids = vec![to_id.to_string()];
        let mut edges = Vec::new();
        let mut current = to_id.to_string();
        while let Some((parent, edge)) = prev.get(&current) {
            edges.push(edge.clone());
            ids.push(parent.clone());
            current = parent.clone();
        }
        ids.reverse();
        edges.reverse();

        let nodes = ids
            .iter()
            .filter_map(|id| view.nodes.get(id).cloned())
            .collect();

        Ok(GraphPath { nodes, edges })
    }

    async fn dependency_chain(
        &self,
        node_id: &str,
        max_depth: usize,
    ) -> Result<DependencyChain> {
        let view = self.load().await?;
        view.require(node_id)?;

        let max_depth = clamp_chain_depth(max_depth);
        let mut nodes = Vec::new();

        if max_depth > 0 {
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(node_id.to_string());

            let mut queue: VecDeque<(String, usize, Vec<String>)> = VecDeque::new();
            queue.push_back((node_id.to_string(), 0, vec![node_id.to_string()]));

            while let Some((current, depth, path)) = queue.pop_front() {
                if depth >= max_depth {
                    continue;
                }
                for edge in view.downstream(&current) {
                    let dependency = &edge.to_id;
                    if visited.contains(dependency) {
                        continue;
                    }
                    visited.insert(dependency.clone());

                    let mut next_path = path.clone();
                    next_path.push(dependency.clone());

                    if let Some(node) = view.nodes.get(dependency) {
                        nodes.push(AffectedNode {
                            node: node.clone(),
                            depth: depth + 1,
                            edge_type: edge.edge_type,
                            path: next_path.clone(),
                        });
                    }

                    queue.push_back((dependency.clone(), depth + 1, next_path));
                }
            }
        }

        Ok(DependencyChain {
            root_id: node_id.to_string(),
            max_depth,
            total: nodes.len(),
            nodes,
        })
    }

    async fn close(&self) {}
}

fn assemble_tree(
    nodes: &HashMap<String, Node>,
    children_of: &HashMap<String, Vec<String>>,
    node: Node,
) -> ImpactTree {
    let children = children_of
        .get(&node.id)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| nodes.get(id).cloned())
                .map(|child| assemble_tree(nodes, children_of, child))
                .collect()
        })
        .unwrap_or_default();

    ImpactTree { node, children }
}
