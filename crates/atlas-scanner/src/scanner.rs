//! Scan execution and concurrency tracking.
//!
//! A scan runs end to end as: record history row → dispatch to the parser
//! → upsert all nodes, then all edges (so foreign keys resolve) → update
//! the row with counts. Parser failures fail the scan; per-record upsert
//! failures downgrade to warnings so one bad record does not lose an
//! otherwise-good scan.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use atlas_core::config::SourceSettings;
use atlas_core::ScanStatus;
use atlas_store::{AssetStore, GraphWriter};

use crate::error::{Result, ScanError};
use crate::parser::{ParseResult, SourceParser};

/// The aggregate pseudo-source: scan every configured source in turn.
pub const SOURCE_ALL: &str = "all";

/// Source-specific knobs a request can carry.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Pull state from the remote backend instead of reading `paths`.
    pub remote_state: bool,
    /// Terraform workspace for remote pulls.
    pub workspace: Option<String>,
    /// Helm chart to render before parsing.
    pub helm_chart: Option<String>,
    pub values_file: Option<String>,
    /// Kubeconfig for live-cluster pulls.
    pub kubeconfig: Option<String>,
    pub kube_context: Option<String>,
    pub namespaces: Vec<String>,
    /// Ansible playbook directory.
    pub playbook_dir: Option<String>,
}

/// A request to run one discovery scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Source kind: "terraform", "kubernetes", "k8s-live", "ansible",
    /// or [`SOURCE_ALL`].
    pub source: String,
    pub paths: Vec<String>,
    pub options: ScanOptions,
}

impl ScanRequest {
    pub fn new(source: &str, paths: Vec<String>) -> Self {
        Self {
            source: source.to_string(),
            paths,
            options: ScanOptions::default(),
        }
    }

    /// The aggregate request the scheduler fires.
    pub fn all() -> Self {
        Self::new(SOURCE_ALL, Vec::new())
    }

    fn from_settings(settings: &SourceSettings) -> Self {
        Self {
            source: settings.source.clone(),
            paths: settings.paths.clone(),
            options: ScanOptions {
                remote_state: settings.remote_state,
                workspace: settings.workspace.clone(),
                helm_chart: settings.helm_chart.clone(),
                values_file: settings.values_file.clone(),
                kubeconfig: settings.kubeconfig.clone(),
                kube_context: settings.kube_context.clone(),
                namespaces: settings.namespaces.clone(),
                playbook_dir: settings.playbook_dir.clone(),
            },
        }
    }
}

/// What a completed scan reports back.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub scan_id: i64,
    pub nodes_found: i64,
    pub edges_found: i64,
    pub warnings: Vec<String>,
}

/// Orchestrates discovery scans. Clone is cheap (inner Arcs); all clones
/// share the running-scan registry.
#[derive(Clone)]
pub struct Scanner {
    store: Arc<AssetStore>,
    sink: Arc<dyn GraphWriter>,
    parsers: Arc<HashMap<String, Arc<dyn SourceParser>>>,
    sources: Arc<Vec<SourceSettings>>,
    running: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl Scanner {
    /// `sink` receives node/edge writes (the bare store, or the synced
    /// decorator when a mirror is configured); scan history always goes to
    /// `store` directly.
    pub fn new(
        store: Arc<AssetStore>,
        sink: Arc<dyn GraphWriter>,
        parsers: Vec<Arc<dyn SourceParser>>,
        sources: Vec<SourceSettings>,
    ) -> Self {
        let parsers = parsers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self {
            store,
            sink,
            parsers: Arc::new(parsers),
            sources: Arc::new(sources),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether any scan is currently in flight.
    pub fn is_running(&self) -> bool {
        !self.registry().is_empty()
    }

    /// Ids of scans currently in flight.
    pub fn running_scans(&self) -> Vec<i64> {
        self.registry().keys().copied().collect()
    }

    /// Request cooperative cancellation of a running scan.
    /// Returns whether the id was found.
    pub fn cancel(&self, scan_id: i64) -> bool {
        match self.registry().get(&scan_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run a scan to completion, blocking the caller.
    pub async fn run_scan(&self, request: &ScanRequest) -> Result<ScanOutcome> {
        let scan_id = self
            .store
            .record_scan(&request.source, &request.paths.join(","))
            .await?;

        let token = CancellationToken::new();
        self.track(scan_id, token.clone());
        let result = self.execute_scan(scan_id, request, &token).await;
        self.untrack(scan_id);
        result
    }

    /// Record the scan row and return its id immediately; the work
    /// proceeds on a detached task with its own cancellation token.
    pub async fn run_scan_async(&self, request: ScanRequest) -> Result<i64> {
        let scan_id = self
            .store
            .record_scan(&request.source, &request.paths.join(","))
            .await?;

        let token = CancellationToken::new();
        self.track(scan_id, token.clone());

        let scanner = self.clone();
        tokio::spawn(async move {
            match scanner.execute_scan(scan_id, &request, &token).await {
                Ok(outcome) => tracing::info!(
                    scan_id,
                    nodes = outcome.nodes_found,
                    edges = outcome.edges_found,
                    warnings = outcome.warnings.len(),
                    "Async scan complete"
                ),
                Err(ScanError::Cancelled) => {
                    tracing::info!(scan_id, "Async scan cancelled")
                }
                Err(e) => tracing::error!(scan_id, error = %e, "Async scan failed"),
            }
            scanner.untrack(scan_id);
        });

        Ok(scan_id)
    }

    async fn execute_scan(
        &self,
        scan_id: i64,
        request: &ScanRequest,
        token: &CancellationToken,
    ) -> Result<ScanOutcome> {
        tracing::info!(scan_id, source = %request.source, "Starting scan");

        if request.source == SOURCE_ALL {
            self.run_all(scan_id, token).await
        } else {
            self.execute_single(scan_id, request, token).await
        }
    }

    /// The synchronous flow for one concrete source.
    async fn execute_single(
        &self,
        scan_id: i64,
        request: &ScanRequest,
        token: &CancellationToken,
    ) -> Result<ScanOutcome> {
        let parsed = match self.dispatch(request, token).await {
            Ok(parsed) => parsed,
            Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
            Err(e) => {
                if let Err(update_err) = self
                    .store
                    .update_scan(scan_id, ScanStatus::Failed, 0, 0)
                    .await
                {
                    tracing::error!(scan_id, error = %update_err, "Failed to mark scan as failed");
                }
                return Err(e);
            }
        };

        let mut warnings = parsed.warnings;
        let mut nodes_found = 0i64;
        let mut edges_found = 0i64;

        // Nodes first, then edges, so edge foreign keys resolve.
        for node in &parsed.nodes {
            if token.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            match self.sink.upsert_node(node).await {
                Ok(()) => nodes_found += 1,
                Err(e) => {
                    tracing::warn!(scan_id, node_id = %node.id, error = %e, "Node upsert failed");
                    warnings.push(format!("node {}: {e}", node.id));
                }
            }
        }

        for edge in &parsed.edges {
            if token.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            match self.sink.upsert_edge(edge).await {
                Ok(()) => edges_found += 1,
                Err(e) => {
                    tracing::warn!(scan_id, edge_id = %edge.id, error = %e, "Edge upsert failed");
                    warnings.push(format!("edge {}: {e}", edge.id));
                }
            }
        }

        self.store
            .update_scan(scan_id, ScanStatus::Completed, nodes_found, edges_found)
            .await?;

        tracing::info!(
            scan_id,
            source = %request.source,
            nodes = nodes_found,
            edges = edges_found,
            warnings = warnings.len(),
            "Scan complete"
        );

        Ok(ScanOutcome {
            scan_id,
            nodes_found,
            edges_found,
            warnings,
        })
    }

    /// Run every configured source through the synchronous flow (each with
    /// its own scan row), totalling counts under the originating row. A
    /// failing source does not abort its siblings.
    async fn run_all(&self, scan_id: i64, token: &CancellationToken) -> Result<ScanOutcome> {
        let mut nodes_found = 0i64;
        let mut edges_found = 0i64;
        let mut warnings = Vec::new();

        for settings in self.sources.iter() {
            if settings.source == SOURCE_ALL {
                continue;
            }
            if token.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let request = ScanRequest::from_settings(settings);
            let sub_id = self
                .store
                .record_scan(&request.source, &request.paths.join(","))
                .await?;

            match self.execute_single(sub_id, &request, token).await {
                Ok(outcome) => {
                    nodes_found += outcome.nodes_found;
                    edges_found += outcome.edges_found;
                    warnings.extend(outcome.warnings);
                }
                Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                Err(e) => {
                    tracing::error!(scan_id = sub_id, source = %request.source, error = %e, "Source scan failed");
                    warnings.push(format!("source {}: {e}", request.source));
                }
            }
        }

        self.store
            .update_scan(scan_id, ScanStatus::Completed, nodes_found, edges_found)
            .await?;

        Ok(ScanOutcome {
            scan_id,
            nodes_found,
            edges_found,
            warnings,
        })
    }

    /// Resolve the parser and run it over every requested path, observing
    /// cancellation at the parse boundary.
    async fn dispatch(
        &self,
        request: &ScanRequest,
        token: &CancellationToken,
    ) -> Result<ParseResult> {
        let parser = self
            .parsers
            .get(&request.source)
            .ok_or_else(|| ScanError::UnknownSource(request.source.clone()))?;

        let parse_all = async {
            let mut merged = ParseResult::default();
            if request.paths.is_empty() {
                // Live pulls carry no path; the parser labels itself.
                merged.merge(parser.parse("", &request.options).await?);
            } else {
                for path in &request.paths {
                    if !parser.supported(path) {
                        merged
                            .warnings
                            .push(format!("{path}: not recognized by {} parser", parser.name()));
                        continue;
                    }
                    merged.merge(parser.parse(path, &request.options).await?);
                }
            }
            Ok(merged)
        };

        tokio::select! {
            _ = token.cancelled() => Err(ScanError::Cancelled),
            result = parse_all => result,
        }
    }

    fn track(&self, scan_id: i64, token: CancellationToken) {
        self.registry().insert(scan_id, token);
    }

    fn untrack(&self, scan_id: i64) {
        self.registry().remove(&scan_id);
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<i64, CancellationToken>> {
        self.running.lock().expect("scan registry poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use atlas_core::{Edge, EdgeType, Node, NodeType};

    struct StubParser {
        name: String,
        result_nodes: Vec<Node>,
        result_edges: Vec<Edge>,
    }

    #[async_trait]
    impl SourceParser for StubParser {
        fn name(&self) -> &str {
            &self.name
        }

        fn supported(&self, _path: &str) -> bool {
            true
        }

        async fn parse(&self, _path: &str, _options: &ScanOptions) -> Result<ParseResult> {
            Ok(ParseResult {
                nodes: self.result_nodes.clone(),
                edges: self.result_edges.clone(),
                warnings: vec![],
            })
        }
    }

    struct SlowParser;

    #[async_trait]
    impl SourceParser for SlowParser {
        fn name(&self) -> &str {
            "slow"
        }

        fn supported(&self, _path: &str) -> bool {
            true
        }

        async fn parse(&self, _path: &str, _options: &ScanOptions) -> Result<ParseResult> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ParseResult::default())
        }
    }

    struct FailingParser;

    #[async_trait]
    impl SourceParser for FailingParser {
        fn name(&self) -> &str {
            "broken"
        }

        fn supported(&self, _path: &str) -> bool {
            true
        }

        async fn parse(&self, _path: &str, _options: &ScanOptions) -> Result<ParseResult> {
            Err(ScanError::Parse("fixture refuses to parse".to_string()))
        }
    }

    fn stub(name: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Arc<dyn SourceParser> {
        Arc::new(StubParser {
            name: name.to_string(),
            result_nodes: nodes,
            result_edges: edges,
        })
    }

    fn sample_graph(source: &str) -> (Vec<Node>, Vec<Edge>) {
        let a = Node::new(source, NodeType::Service, "api");
        let b = Node::new(source, NodeType::Database, "db");
        let edge = Edge::new(&a.id, EdgeType::DependsOn, &b.id);
        (vec![a, b], vec![edge])
    }

    async fn scanner_with(
        parsers: Vec<Arc<dyn SourceParser>>,
        sources: Vec<SourceSettings>,
    ) -> (Scanner, Arc<AssetStore>) {
        let store = Arc::new(AssetStore::open_in_memory().await.unwrap());
        let scanner = Scanner::new(store.clone(), store.clone(), parsers, sources);
        (scanner, store)
    }

    fn source_settings(source: &str, path: &str) -> SourceSettings {
        SourceSettings {
            source: source.to_string(),
            paths: vec![path.to_string()],
            remote_state: false,
            workspace: None,
            helm_chart: None,
            values_file: None,
            kubeconfig: None,
            kube_context: None,
            namespaces: vec![],
            playbook_dir: None,
        }
    }

    #[tokio::test]
    async fn run_scan_persists_and_completes_row() {
        let (nodes, edges) = sample_graph("terraform");
        let (scanner, store) =
            scanner_with(vec![stub("terraform", nodes, edges)], vec![]).await;

        let outcome = scanner
            .run_scan(&ScanRequest::new("terraform", vec!["state.tfstate".into()]))
            .await
            .unwrap();

        assert_eq!(outcome.nodes_found, 2);
        assert_eq!(outcome.edges_found, 1);
        assert!(outcome.warnings.is_empty());
        assert_eq!(store.node_count().await.unwrap(), 2);

        let scans = store.list_scans(1).await.unwrap();
        assert_eq!(scans[0].id, outcome.scan_id);
        assert_eq!(scans[0].status, ScanStatus::Completed);
        assert_eq!(scans[0].nodes_found, 2);
    }

    #[tokio::test]
    async fn unknown_source_fails_the_scan_row() {
        let (scanner, store) = scanner_with(vec![], vec![]).await;

        let err = scanner
            .run_scan(&ScanRequest::new("fortran", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::UnknownSource(_)));

        let scans = store.list_scans(1).await.unwrap();
        assert_eq!(scans[0].status, ScanStatus::Failed);
    }

    #[tokio::test]
    async fn bad_edge_is_a_warning_not_a_failure() {
        let (nodes, _) = sample_graph("terraform");
        let dangling = Edge::new("terraform:service:api", EdgeType::DependsOn, "missing:node:x");
        let (scanner, store) =
            scanner_with(vec![stub("terraform", nodes, vec![dangling])], vec![]).await;

        let outcome = scanner
            .run_scan(&ScanRequest::new("terraform", vec![]))
            .await
            .unwrap();

        assert_eq!(outcome.nodes_found, 2);
        assert_eq!(outcome.edges_found, 0);
        assert_eq!(outcome.warnings.len(), 1);

        let scans = store.list_scans(1).await.unwrap();
        assert_eq!(scans[0].status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn async_scan_tracks_running_state() {
        let (scanner, store) = scanner_with(vec![Arc::new(SlowParser)], vec![]).await;

        assert!(!scanner.is_running());
        let scan_id = scanner
            .run_scan_async(ScanRequest::new("slow", vec![]))
            .await
            .unwrap();
        assert!(scanner.is_running());
        assert_eq!(scanner.running_scans(), vec![scan_id]);

        let scans = store.list_scans(1).await.unwrap();
        assert_eq!(scans[0].status, ScanStatus::Running);

        assert!(scanner.cancel(scan_id));
        for _ in 0..50 {
            if !scanner.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!scanner.is_running());

        // A cancelled scan leaves its row in whatever state it last wrote.
        let scans = store.list_scans(1).await.unwrap();
        assert_eq!(scans[0].status, ScanStatus::Running);
    }

    struct PickyParser;

    #[async_trait]
    impl SourceParser for PickyParser {
        fn name(&self) -> &str {
            "picky"
        }

        fn supported(&self, path: &str) -> bool {
            path.ends_with(".json")
        }

        async fn parse(&self, _path: &str, _options: &ScanOptions) -> Result<ParseResult> {
            let mut result = ParseResult::default();
            result.nodes.push(Node::new("picky", NodeType::Vm, "only"));
            Ok(result)
        }
    }

    #[tokio::test]
    async fn unsupported_paths_are_skipped_with_a_warning() {
        let (scanner, store) = scanner_with(vec![Arc::new(PickyParser)], vec![]).await;

        let outcome = scanner
            .run_scan(&ScanRequest::new(
                "picky",
                vec!["good.json".into(), "bad.yaml".into()],
            ))
            .await
            .unwrap();

        assert_eq!(outcome.nodes_found, 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("bad.yaml"));
        assert_eq!(store.node_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_unknown_scan_is_false() {
        let (scanner, _) = scanner_with(vec![], vec![]).await;
        assert!(!scanner.cancel(42));
    }

    #[tokio::test]
    async fn aggregate_totals_under_originating_row() {
        let (tf_nodes, tf_edges) = sample_graph("terraform");
        let (k8s_nodes, k8s_edges) = sample_graph("kubernetes");
        let (scanner, store) = scanner_with(
            vec![
                stub("terraform", tf_nodes, tf_edges),
                stub("kubernetes", k8s_nodes, k8s_edges),
            ],
            vec![
                source_settings("terraform", "prod.tfstate"),
                source_settings("kubernetes", "manifests/"),
            ],
        )
        .await;

        let outcome = scanner.run_scan(&ScanRequest::all()).await.unwrap();
        assert_eq!(outcome.nodes_found, 4);
        assert_eq!(outcome.edges_found, 2);

        // Originating row plus one row per source.
        let scans = store.list_scans(10).await.unwrap();
        assert_eq!(scans.len(), 3);
        let originating = scans.iter().find(|s| s.id == outcome.scan_id).unwrap();
        assert_eq!(originating.source, SOURCE_ALL);
        assert_eq!(originating.nodes_found, 4);
        assert!(scans
            .iter()
            .all(|s| s.status == ScanStatus::Completed));
    }

    #[tokio::test]
    async fn aggregate_failing_source_does_not_abort_siblings() {
        let (tf_nodes, tf_edges) = sample_graph("terraform");
        let (scanner, store) = scanner_with(
            vec![
                stub("terraform", tf_nodes, tf_edges),
                Arc::new(FailingParser),
            ],
            vec![
                source_settings("broken", "bad.yaml"),
                source_settings("terraform", "prod.tfstate"),
            ],
        )
        .await;

        let outcome = scanner.run_scan(&ScanRequest::all()).await.unwrap();
        assert_eq!(outcome.nodes_found, 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("broken"));

        let scans = store.list_scans(10).await.unwrap();
        let failed = scans.iter().filter(|s| s.status == ScanStatus::Failed).count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn concurrent_scans_may_overlap() {
        let (nodes, edges) = sample_graph("terraform");
        let (scanner, _) = scanner_with(
            vec![stub("terraform", nodes, edges), Arc::new(SlowParser)],
            vec![],
        )
        .await;

        let slow_id = scanner
            .run_scan_async(ScanRequest::new("slow", vec![]))
            .await
            .unwrap();
        assert!(scanner.is_running());

        // A direct caller is not blocked by the in-flight scan.
        let outcome = scanner
            .run_scan(&ScanRequest::new("terraform", vec![]))
            .await
            .unwrap();
        assert_eq!(outcome.nodes_found, 2);

        scanner.cancel(slow_id);
    }
}
