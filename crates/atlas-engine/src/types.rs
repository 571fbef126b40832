//! Traversal result types.

use serde::Serialize;

use atlas_core::{Edge, EdgeType, Node};

/// A node reached by a traversal, with how it was reached.
#[derive(Debug, Clone, Serialize)]
pub struct AffectedNode {
    pub node: Node,
    /// Hop distance from the traversal root.
    pub depth: usize,
    /// Type of the edge adjacent to this node on the discovered path.
    pub edge_type: EdgeType,
    /// Node ids from the root to this node, inclusive of both.
    pub path: Vec<String>,
}

/// The upstream-reachable set of an asset: everything that would be
/// impaired if it failed.
#[derive(Debug, Clone, Serialize)]
pub struct BlastRadius {
    pub root_id: String,
    pub affected: Vec<AffectedNode>,
    pub total_affected: usize,
}

/// The blast radius organized as a tree rooted at the failed asset.
/// Cycles are broken by first visit, so each node appears exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactTree {
    pub node: Node,
    pub children: Vec<ImpactTree>,
}

impl ImpactTree {
    /// Total number of nodes in the tree, root included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ImpactTree::node_count).sum::<usize>()
    }
}

/// The downstream-reachable set of an asset.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyChain {
    pub root_id: String,
    pub max_depth: usize,
    pub nodes: Vec<AffectedNode>,
    pub total: usize,
}

/// An undirected path between two assets.
#[derive(Debug, Clone, Serialize)]
pub struct GraphPath {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}
