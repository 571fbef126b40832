//! The SQLite-backed asset graph store.
//!
//! Schema: `nodes`, `edges` (composite key on the relationship triple,
//! foreign keys with cascade), `scans` (rowid history). Timestamps are
//! stored as fixed-width RFC3339 text so lexicographic comparison matches
//! chronological order.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use atlas_core::{Edge, EdgeType, Node, NodeType, Scan, ScanStatus};

use crate::error::{Result, StoreError};
use crate::writer::GraphWriter;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    node_type   TEXT NOT NULL,
    source      TEXT NOT NULL,
    source_file TEXT NOT NULL DEFAULT '',
    provider    TEXT NOT NULL DEFAULT '',
    metadata    TEXT NOT NULL DEFAULT '{}',
    expires_at  TEXT,
    first_seen  TEXT NOT NULL,
    last_seen   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS edges (
    id        TEXT NOT NULL,
    from_id   TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    to_id     TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    edge_type TEXT NOT NULL,
    metadata  TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (from_id, to_id, edge_type)
);

CREATE TABLE IF NOT EXISTS scans (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source      TEXT NOT NULL,
    source_path TEXT NOT NULL DEFAULT '',
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    nodes_found INTEGER NOT NULL DEFAULT 0,
    edges_found INTEGER NOT NULL DEFAULT 0,
    status      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
CREATE INDEX IF NOT EXISTS idx_nodes_source ON nodes(source);
CREATE INDEX IF NOT EXISTS idx_nodes_expires ON nodes(expires_at) WHERE expires_at IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);
";

/// Filter for node listings. Conditions are AND-composed.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub node_type: Option<NodeType>,
    pub source: Option<String>,
    pub provider: Option<String>,
    /// Select nodes whose `last_seen` is older than now minus this many days.
    pub stale_days: Option<i64>,
}

/// Filter for edge listings. Conditions are AND-composed.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub edge_type: Option<EdgeType>,
    pub from_id: Option<String>,
    pub to_id: Option<String>,
}

/// Adjacency maps materialized from a single edge read.
///
/// `downstream` keys on `from_id` (dependency chain direction);
/// `upstream` keys on `to_id` (blast radius direction).
#[derive(Debug, Default)]
pub struct Adjacency {
    pub downstream: HashMap<String, Vec<Edge>>,
    pub upstream: HashMap<String, Vec<Edge>>,
}

/// A complete read of the graph, used by the export serializers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Thread-safe handle to the embedded asset graph database.
///
/// Clone is cheap (inner pool).
#[derive(Clone)]
pub struct AssetStore {
    pool: SqlitePool,
}

impl AssetStore {
    /// Open (creating if missing) the database at `path` with WAL
    /// journaling and cascading foreign keys enabled, and ensure the
    /// schema exists.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        tracing::info!(path = %path, "Asset store opened");
        Ok(Self { pool })
    }

    /// Open a private in-memory database. Used by tests and one-shot runs.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);

        // A single connection keeps every query on the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ── Node operations ──────────────────────────────────────────

    /// Insert the node, or update every field except `first_seen` when the
    /// id already exists.
    pub async fn upsert_node(&self, node: &Node) -> Result<()> {
        let metadata = serde_json::to_string(&node.metadata)?;

        sqlx::query(
            "INSERT INTO nodes
                 (id, name, node_type, source, source_file, provider,
                  metadata, expires_at, first_seen, last_seen)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name        = excluded.name,
                 node_type   = excluded.node_type,
                 source      = excluded.source,
                 source_file = excluded.source_file,
                 provider    = excluded.provider,
                 metadata    = excluded.metadata,
                 expires_at  = excluded.expires_at,
                 last_seen   = excluded.last_seen",
        )
        .bind(&node.id)
        .bind(&node.name)
        .bind(node.node_type.as_str())
        .bind(&node.source)
        .bind(&node.source_file)
        .bind(&node.provider)
        .bind(&metadata)
        .bind(node.expires_at.map(fmt_ts))
        .bind(fmt_ts(node.first_seen))
        .bind(fmt_ts(node.last_seen))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a node by id. A miss is `Ok(None)`, not an error.
    pub async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Node::try_from).transpose()
    }

    /// List nodes matching the filter, ordered by (type, name).
    pub async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM nodes");
        let mut sep = " WHERE ";

        if let Some(t) = filter.node_type {
            qb.push(sep).push("node_type = ").push_bind(t.as_str());
            sep = " AND ";
        }
        if let Some(source) = &filter.source {
            qb.push(sep).push("source = ").push_bind(source.clone());
            sep = " AND ";
        }
        if let Some(provider) = &filter.provider {
            qb.push(sep).push("provider = ").push_bind(provider.clone());
            sep = " AND ";
        }
        if let Some(days) = filter.stale_days {
            let cutoff = fmt_ts(Utc::now() - chrono::Duration::days(days));
            qb.push(sep).push("last_seen < ").push_bind(cutoff);
        }

        qb.push(" ORDER BY node_type, name");

        let rows: Vec<NodeRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Node::try_from).collect()
    }

    /// Delete a node; incident edges go with it via cascade.
    /// Returns whether the node existed.
    pub async fn delete_node(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Edge operations ──────────────────────────────────────────

    /// Insert the edge, or update only its metadata when the
    /// `(from_id, to_id, type)` triple already exists (the stored id stays
    /// the first one observed).
    pub async fn upsert_edge(&self, edge: &Edge) -> Result<()> {
        let metadata = serde_json::to_string(&edge.metadata)?;

        sqlx::query(
            "INSERT INTO edges (id, from_id, to_id, edge_type, metadata)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(from_id, to_id, edge_type) DO UPDATE SET
                 metadata = excluded.metadata",
        )
        .bind(&edge.id)
        .bind(&edge.from_id)
        .bind(&edge.to_id)
        .bind(edge.edge_type.as_str())
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List edges matching the filter, ordered by (type, from_id).
    pub async fn list_edges(&self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM edges");
        let mut sep = " WHERE ";

        if let Some(t) = filter.edge_type {
            qb.push(sep).push("edge_type = ").push_bind(t.as_str());
            sep = " AND ";
        }
        if let Some(from_id) = &filter.from_id {
            qb.push(sep).push("from_id = ").push_bind(from_id.clone());
            sep = " AND ";
        }
        if let Some(to_id) = &filter.to_id {
            qb.push(sep).push("to_id = ").push_bind(to_id.clone());
        }

        qb.push(" ORDER BY edge_type, from_id, to_id");

        let rows: Vec<EdgeRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Edge::try_from).collect()
    }

    /// Distinct nodes on the other end of any incident edge, in either
    /// direction, ordered by (type, name).
    pub async fn get_neighbors(&self, id: &str) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            "SELECT DISTINCT n.*
             FROM nodes n
             JOIN edges e
               ON (n.id = e.to_id AND e.from_id = ?)
               OR (n.id = e.from_id AND e.to_id = ?)
             ORDER BY n.node_type, n.name",
        )
        .bind(id)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Node::try_from).collect()
    }

    // ── Aggregates ───────────────────────────────────────────────

    pub async fn node_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn edge_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM edges")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn node_count_by_type(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type ORDER BY node_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn edge_count_by_type(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT edge_type, COUNT(*) FROM edges GROUP BY edge_type ORDER BY edge_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Nodes whose `expires_at` falls within the next `days` days,
    /// soonest first.
    pub async fn expiring_nodes(&self, days: i64) -> Result<Vec<Node>> {
        let now = Utc::now();
        let horizon = now + chrono::Duration::days(days);

        let rows: Vec<NodeRow> = sqlx::query_as(
            "SELECT * FROM nodes
             WHERE expires_at IS NOT NULL
               AND expires_at >= ?
               AND expires_at <= ?
             ORDER BY expires_at",
        )
        .bind(fmt_ts(now))
        .bind(fmt_ts(horizon))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Node::try_from).collect()
    }

    // ── Scan history ─────────────────────────────────────────────

    /// Record a new scan as running and return its id.
    pub async fn record_scan(&self, source: &str, source_path: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO scans (source, source_path, started_at, status)
             VALUES (?, ?, ?, ?)",
        )
        .bind(source)
        .bind(source_path)
        .bind(fmt_ts(Utc::now()))
        .bind(ScanStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Update a scan's status and counts; terminal states also stamp
    /// `finished_at`.
    pub async fn update_scan(
        &self,
        id: i64,
        status: ScanStatus,
        nodes_found: i64,
        edges_found: i64,
    ) -> Result<()> {
        let finished_at = matches!(status, ScanStatus::Completed | ScanStatus::Failed)
            .then(|| fmt_ts(Utc::now()));

        sqlx::query(
            "UPDATE scans
             SET status = ?, nodes_found = ?, edges_found = ?,
                 finished_at = COALESCE(?, finished_at)
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(nodes_found)
        .bind(edges_found)
        .bind(finished_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent scans first.
    pub async fn list_scans(&self, limit: i64) -> Result<Vec<Scan>> {
        let rows: Vec<ScanRow> = sqlx::query_as("SELECT * FROM scans ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Scan::try_from).collect()
    }

    // ── Bulk reads ───────────────────────────────────────────────

    /// Read all edges once and materialize both adjacency directions.
    pub async fn build_adjacency(&self) -> Result<Adjacency> {
        let edges = self.list_edges(&EdgeFilter::default()).await?;

        let mut adjacency = Adjacency::default();
        for edge in edges {
            adjacency
                .downstream
                .entry(edge.from_id.clone())
                .or_default()
                .push(edge.clone());
            adjacency
                .upstream
                .entry(edge.to_id.clone())
                .or_default()
                .push(edge);
        }

        Ok(adjacency)
    }

    /// A single consistent read of the entire graph.
    pub async fn export_graph(&self) -> Result<GraphSnapshot> {
        Ok(GraphSnapshot {
            nodes: self.list_nodes(&NodeFilter::default()).await?,
            edges: self.list_edges(&EdgeFilter::default()).await?,
        })
    }
}

#[async_trait]
impl GraphWriter for AssetStore {
    async fn upsert_node(&self, node: &Node) -> Result<()> {
        AssetStore::upsert_node(self, node).await
    }

    async fn upsert_edge(&self, edge: &Edge) -> Result<()> {
        AssetStore::upsert_edge(self, edge).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        AssetStore::delete_node(self, id).await
    }
}

// ── Row mapping ──────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct NodeRow {
    id: String,
    name: String,
    node_type: String,
    source: String,
    source_file: String,
    provider: String,
    metadata: String,
    expires_at: Option<String>,
    first_seen: String,
    last_seen: String,
}

impl TryFrom<NodeRow> for Node {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Node> {
        let node_type = NodeType::from_str(&row.node_type)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        // A corrupt metadata column degrades to an empty mapping.
        let metadata: BTreeMap<String, String> =
            serde_json::from_str(&row.metadata).unwrap_or_default();

        Ok(Node {
            id: row.id,
            name: row.name,
            node_type,
            source: row.source,
            source_file: row.source_file,
            provider: row.provider,
            metadata,
            expires_at: row.expires_at.as_deref().map(parse_ts),
            first_seen: parse_ts(&row.first_seen),
            last_seen: parse_ts(&row.last_seen),
        })
    }
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: String,
    from_id: String,
    to_id: String,
    edge_type: String,
    metadata: String,
}

impl TryFrom<EdgeRow> for Edge {
    type Error = StoreError;

    fn try_from(row: EdgeRow) -> Result<Edge> {
        let edge_type = EdgeType::from_str(&row.edge_type)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let metadata: BTreeMap<String, String> =
            serde_json::from_str(&row.metadata).unwrap_or_default();

        Ok(Edge {
            id: row.id,
            from_id: row.from_id,
            to_id: row.to_id,
            edge_type,
            metadata,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScanRow {
    id: i64,
    source: String,
    source_path: String,
    started_at: String,
    finished_at: Option<String>,
    nodes_found: i64,
    edges_found: i64,
    status: String,
}

impl TryFrom<ScanRow> for Scan {
    type Error = StoreError;

    fn try_from(row: ScanRow) -> Result<Scan> {
        let status = ScanStatus::from_str(&row.status)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Scan {
            id: row.id,
            source: row.source,
            source_path: row.source_path,
            started_at: parse_ts(&row.started_at),
            finished_at: row.finished_at.as_deref().map(parse_ts),
            nodes_found: row.nodes_found,
            edges_found: row.edges_found,
            status,
        })
    }
}

/// Fixed-width RFC3339 (microseconds, Z suffix): lexicographic order is
/// chronological order.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}
