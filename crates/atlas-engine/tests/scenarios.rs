//! End-to-end traversal scenarios over an in-memory store, including the
//! remote-fallback behavior with an always-failing remote stub.

use std::sync::Arc;

use async_trait::async_trait;

use atlas_core::{Edge, EdgeType, Node, NodeType};
use atlas_engine::{GraphEngine, LocalEngine, RemoteEngine, RemoteGraph};
use atlas_graph::client::GraphError;
use atlas_graph::queries::{PathRow, PathStep};
use atlas_store::{AssetStore, EdgeFilter};

fn node(name: &str) -> Node {
    Node::new("t", NodeType::Service, name)
}

fn dep(from: &Node, to: &Node) -> Edge {
    Edge::new(&from.id, EdgeType::DependsOn, &to.id)
}

async fn store_with(nodes: &[Node], edges: &[Edge]) -> Arc<AssetStore> {
    let store = Arc::new(AssetStore::open_in_memory().await.unwrap());
    for n in nodes {
        store.upsert_node(n).await.unwrap();
    }
    for e in edges {
        store.upsert_edge(e).await.unwrap();
    }
    store
}

/// a —depends_on→ b —depends_on→ c
async fn linear() -> (Arc<AssetStore>, Node, Node, Node) {
    let (a, b, c) = (node("a"), node("b"), node("c"));
    let store = store_with(
        &[a.clone(), b.clone(), c.clone()],
        &[dep(&a, &b), dep(&b, &c)],
    )
    .await;
    (store, a, b, c)
}

#[tokio::test]
async fn linear_dependency_scenario() {
    let (store, a, b, c) = linear().await;
    let engine = LocalEngine::new(store);

    let blast = engine.blast_radius(&c.id).await.unwrap();
    assert_eq!(blast.total_affected, 2);

    let tree = engine.blast_radius_tree(&c.id).await.unwrap();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].node.id, b.id);
    assert_eq!(tree.children[0].children.len(), 1);
    assert_eq!(tree.children[0].children[0].node.id, a.id);

    let deep = engine.dependency_chain(&a.id, 10).await.unwrap();
    let mut ids: Vec<&str> = deep.nodes.iter().map(|n| n.node.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec![b.id.as_str(), c.id.as_str()]);

    let shallow = engine.dependency_chain(&a.id, 1).await.unwrap();
    assert_eq!(shallow.total, 1);
    assert_eq!(shallow.nodes[0].node.id, b.id);
}

#[tokio::test]
async fn cycle_scenario_terminates() {
    let (a, b, c) = (node("a"), node("b"), node("c"));
    let store = store_with(
        &[a.clone(), b.clone(), c.clone()],
        &[dep(&a, &b), dep(&b, &c), dep(&c, &a)],
    )
    .await;
    let engine = LocalEngine::new(store);

    let chain = engine.dependency_chain(&a.id, 10).await.unwrap();
    let mut ids: Vec<&str> = chain.nodes.iter().map(|n| n.node.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec![b.id.as_str(), c.id.as_str()]);

    let tree = engine.blast_radius_tree(&a.id).await.unwrap();
    assert_eq!(tree.node_count(), 3);
}

#[tokio::test]
async fn diamond_scenario() {
    let (a, b, c, d) = (node("a"), node("b"), node("c"), node("d"));
    let store = store_with(
        &[a.clone(), b.clone(), c.clone(), d.clone()],
        &[dep(&a, &c), dep(&a, &d), dep(&b, &c), dep(&b, &d)],
    )
    .await;
    let engine = LocalEngine::new(store);

    let blast = engine.blast_radius(&c.id).await.unwrap();
    assert_eq!(blast.total_affected, 2);
    let mut ids: Vec<&str> = blast.affected.iter().map(|n| n.node.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
}

#[tokio::test]
async fn cross_source_scans_coexist() {
    let store = Arc::new(AssetStore::open_in_memory().await.unwrap());

    for name in ["one", "two"] {
        store
            .upsert_node(&Node::new("s1", NodeType::Vm, name))
            .await
            .unwrap();
    }
    for name in ["three", "four", "five"] {
        store
            .upsert_node(&Node::new("s2", NodeType::Vm, name))
            .await
            .unwrap();
    }

    let s1 = store
        .list_nodes(&atlas_store::NodeFilter {
            source: Some("s1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let s2 = store
        .list_nodes(&atlas_store::NodeFilter {
            source: Some("s2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let s1_ids: Vec<&String> = s1.iter().map(|n| &n.id).collect();
    assert!(s2.iter().all(|n| !s1_ids.contains(&&n.id)));
    assert_eq!(
        (s1.len() + s2.len()) as i64,
        store.node_count().await.unwrap()
    );
}

// ── Traversal laws ───────────────────────────────────────────────

#[tokio::test]
async fn blast_radius_equals_tree_minus_root() {
    let (store, _, _, c) = linear().await;
    let engine = LocalEngine::new(store);

    let blast = engine.blast_radius(&c.id).await.unwrap();
    let tree = engine.blast_radius_tree(&c.id).await.unwrap();
    assert_eq!(blast.total_affected, tree.node_count() - 1);
}

#[tokio::test]
async fn neighbors_equal_distinct_edge_endpoints() {
    let (store, _, b, _) = linear().await;
    let engine = LocalEngine::new(store.clone());

    let neighbors = engine.neighbors(&b.id).await.unwrap();
    let mut neighbor_ids: Vec<String> = neighbors.into_iter().map(|n| n.id).collect();
    neighbor_ids.sort();

    let from_b = store
        .list_edges(&EdgeFilter {
            from_id: Some(b.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    let to_b = store
        .list_edges(&EdgeFilter {
            to_id: Some(b.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut endpoint_ids: Vec<String> = from_b
        .iter()
        .map(|e| e.to_id.clone())
        .chain(to_b.iter().map(|e| e.from_id.clone()))
        .collect();
    endpoint_ids.sort();
    endpoint_ids.dedup();

    assert_eq!(neighbor_ids, endpoint_ids);
}

// ── Remote fallback ──────────────────────────────────────────────

/// A remote that fails every call, standing in for an unreachable Neo4j.
struct UnreachableRemote;

fn down() -> GraphError {
    GraphError::Connection("stub: remote unavailable".to_string())
}

#[async_trait]
impl RemoteGraph for UnreachableRemote {
    async fn fetch_node(&self, _id: &str) -> Result<Option<Node>, GraphError> {
        Err(down())
    }

    async fn upstream_paths(&self, _id: &str) -> Result<Vec<PathRow>, GraphError> {
        Err(down())
    }

    async fn downstream_paths(
        &self,
        _id: &str,
        _max_depth: usize,
    ) -> Result<Vec<PathRow>, GraphError> {
        Err(down())
    }

    async fn shortest_path_steps(
        &self,
        _from_id: &str,
        _to_id: &str,
    ) -> Result<Vec<PathStep>, GraphError> {
        Err(down())
    }

    async fn neighbor_nodes(&self, _id: &str) -> Result<Vec<Node>, GraphError> {
        Err(down())
    }
}

#[tokio::test]
async fn remote_failure_falls_back_to_local() {
    let (store, a, b, c) = linear().await;
    let local = LocalEngine::new(store);
    let engine = RemoteEngine::new(UnreachableRemote, local.clone());

    let blast = engine.blast_radius(&c.id).await.unwrap();
    assert_eq!(blast.total_affected, 2);

    let chain = engine.dependency_chain(&a.id, 10).await.unwrap();
    assert_eq!(chain.total, 2);

    let path = engine.shortest_path(&a.id, &c.id).await.unwrap();
    assert_eq!(path.nodes.len(), 3);

    let neighbors = engine.neighbors(&b.id).await.unwrap();
    assert_eq!(neighbors.len(), 2);

    let tree = engine.blast_radius_tree(&c.id).await.unwrap();
    assert_eq!(tree.node_count(), 3);
}

#[tokio::test]
async fn fallback_result_matches_local_result() {
    let (store, _, _, c) = linear().await;
    let local = LocalEngine::new(store);
    let remote = RemoteEngine::new(UnreachableRemote, local.clone());

    let via_local = local.blast_radius(&c.id).await.unwrap();
    let via_remote = remote.blast_radius(&c.id).await.unwrap();

    let ids = |b: &atlas_engine::BlastRadius| {
        let mut v: Vec<String> = b.affected.iter().map(|n| n.node.id.clone()).collect();
        v.sort();
        v
    };
    assert_eq!(ids(&via_local), ids(&via_remote));
    assert_eq!(via_local.total_affected, via_remote.total_affected);
}
