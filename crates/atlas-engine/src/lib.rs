//! atlas-engine: read-side traversals over the asset graph.
//!
//! The [`GraphEngine`] capability set has two interchangeable
//! implementations: [`LocalEngine`] rebuilds adjacency from the store per
//! query and runs in-memory BFS; [`RemoteEngine`] issues one Cypher path
//! query per traversal and transparently falls back to a local engine on
//! any remote failure. The export module serializes the whole graph to
//! JSON, Graphviz DOT, and Mermaid.

pub mod error;
pub mod export;
pub mod local;
pub mod remote;
pub mod types;

pub use error::{EngineError, Result};
pub use local::LocalEngine;
pub use remote::{RemoteEngine, RemoteGraph};
pub use types::{AffectedNode, BlastRadius, DependencyChain, GraphPath, ImpactTree};

use async_trait::async_trait;

use atlas_core::Node;

/// Hop ceiling for dependency chains; out-of-range requests clamp to this.
pub const MAX_CHAIN_DEPTH: usize = 50;

/// The traversal capability set the rest of the system consumes.
///
/// Orientation: an edge `A —depends_on→ B` means A requires B, so blast
/// radius walks against arrow direction and dependency chains walk with it.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    /// Every node with a directed path into `node_id`, excluding the node
    /// itself, annotated with depth, last-hop edge type, and path.
    async fn blast_radius(&self, node_id: &str) -> Result<BlastRadius>;

    /// The same set organized as a first-visit tree rooted at `node_id`.
    async fn blast_radius_tree(&self, node_id: &str) -> Result<ImpactTree>;

    /// Direct undirected neighbors, deduplicated, ordered by (type, name).
    async fn neighbors(&self, node_id: &str) -> Result<Vec<Node>>;

    /// Undirected shortest path; errors when the nodes are disconnected.
    async fn shortest_path(&self, from_id: &str, to_id: &str) -> Result<GraphPath>;

    /// Downstream reachability from `node_id`, bounded by `max_depth` hops
    /// (0 yields the empty chain, values above [`MAX_CHAIN_DEPTH`] clamp).
    async fn dependency_chain(&self, node_id: &str, max_depth: usize)
        -> Result<DependencyChain>;

    /// Release any held resources.
    async fn close(&self);
}

/// Normalize a requested chain depth to the supported range.
pub(crate) fn clamp_chain_depth(max_depth: usize) -> usize {
    max_depth.min(MAX_CHAIN_DEPTH)
}
