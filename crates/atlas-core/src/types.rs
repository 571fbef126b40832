//! Core domain types for the Atlas asset graph.
//!
//! Nodes are infrastructure assets discovered from declarative sources
//! (Terraform state, Kubernetes manifests, Ansible inventories, live
//! clusters); edges are typed directed relationships between them. Both
//! carry stable deterministic identities so re-discovery upserts instead
//! of duplicating.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Node Types ────────────────────────────────────────────────────

/// The kind of infrastructure asset a node represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Vm,
    Container,
    Pod,
    Service,
    Ingress,
    LoadBalancer,
    Database,
    Bucket,
    DnsRecord,
    Certificate,
    Secret,
    FirewallRule,
    Network,
    Subnet,
    Ip,
    Namespace,
    #[serde(rename = "node")]
    ClusterNode,
    Queue,
    Pubsub,
    IamBinding,
    IamPolicy,
    IamGroup,
    KmsKey,
    ServiceAccount,
    Cdn,
    Disk,
    InstanceGroup,
    HealthCheck,
    BackendService,
    Monitor,
    Function,
    ApiGateway,
    NosqlDb,
}

impl NodeType {
    /// The stable wire/storage string for this asset kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Vm => "vm",
            NodeType::Container => "container",
            NodeType::Pod => "pod",
            NodeType::Service => "service",
            NodeType::Ingress => "ingress",
            NodeType::LoadBalancer => "load_balancer",
            NodeType::Database => "database",
            NodeType::Bucket => "bucket",
            NodeType::DnsRecord => "dns_record",
            NodeType::Certificate => "certificate",
            NodeType::Secret => "secret",
            NodeType::FirewallRule => "firewall_rule",
            NodeType::Network => "network",
            NodeType::Subnet => "subnet",
            NodeType::Ip => "ip",
            NodeType::Namespace => "namespace",
            NodeType::ClusterNode => "node",
            NodeType::Queue => "queue",
            NodeType::Pubsub => "pubsub",
            NodeType::IamBinding => "iam_binding",
            NodeType::IamPolicy => "iam_policy",
            NodeType::IamGroup => "iam_group",
            NodeType::KmsKey => "kms_key",
            NodeType::ServiceAccount => "service_account",
            NodeType::Cdn => "cdn",
            NodeType::Disk => "disk",
            NodeType::InstanceGroup => "instance_group",
            NodeType::HealthCheck => "health_check",
            NodeType::BackendService => "backend_service",
            NodeType::Monitor => "monitor",
            NodeType::Function => "function",
            NodeType::ApiGateway => "api_gateway",
            NodeType::NosqlDb => "nosql_db",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vm" => Ok(NodeType::Vm),
            "container" => Ok(NodeType::Container),
            "pod" => Ok(NodeType::Pod),
            "service" => Ok(NodeType::Service),
            "ingress" => Ok(NodeType::Ingress),
            "load_balancer" => Ok(NodeType::LoadBalancer),
            "database" => Ok(NodeType::Database),
            "bucket" => Ok(NodeType::Bucket),
            "dns_record" => Ok(NodeType::DnsRecord),
            "certificate" => Ok(NodeType::Certificate),
            "secret" => Ok(NodeType::Secret),
            "firewall_rule" => Ok(NodeType::FirewallRule),
            "network" => Ok(NodeType::Network),
            "subnet" => Ok(NodeType::Subnet),
            "ip" => Ok(NodeType::Ip),
            "namespace" => Ok(NodeType::Namespace),
            "node" => Ok(NodeType::ClusterNode),
            "queue" => Ok(NodeType::Queue),
            "pubsub" => Ok(NodeType::Pubsub),
            "iam_binding" => Ok(NodeType::IamBinding),
            "iam_policy" => Ok(NodeType::IamPolicy),
            "iam_group" => Ok(NodeType::IamGroup),
            "kms_key" => Ok(NodeType::KmsKey),
            "service_account" => Ok(NodeType::ServiceAccount),
            "cdn" => Ok(NodeType::Cdn),
            "disk" => Ok(NodeType::Disk),
            "instance_group" => Ok(NodeType::InstanceGroup),
            "health_check" => Ok(NodeType::HealthCheck),
            "backend_service" => Ok(NodeType::BackendService),
            "monitor" => Ok(NodeType::Monitor),
            "function" => Ok(NodeType::Function),
            "api_gateway" => Ok(NodeType::ApiGateway),
            "nosql_db" => Ok(NodeType::NosqlDb),
            other => Err(UnknownTypeError {
                kind: "node",
                value: other.to_string(),
            }),
        }
    }
}

/// A type string that does not belong to the closed node/edge type sets.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} type: {value}")]
pub struct UnknownTypeError {
    pub kind: &'static str,
    pub value: String,
}

// ── Node ──────────────────────────────────────────────────────────

/// An infrastructure asset in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Stable namespaced identity: `"<source>:<type>:<name>"`.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Which discovery pipeline produced this node.
    pub source: String,
    /// Origin path or live-pull label.
    pub source_file: String,
    /// Cloud or platform tag.
    pub provider: String,
    /// Free-form string properties. Never null; empty when absent.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Expiry timestamp; populated only for certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Node {
    /// Build a node with a derived id and both seen-timestamps set to now.
    pub fn new(source: &str, node_type: NodeType, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::make_id(source, node_type, name),
            name: name.to_string(),
            node_type,
            source: source.to_string(),
            source_file: String::new(),
            provider: String::new(),
            metadata: BTreeMap::new(),
            expires_at: None,
            first_seen: now,
            last_seen: now,
        }
    }

    /// The deterministic node identity: `"<source>:<type>:<name>"`.
    pub fn make_id(source: &str, node_type: NodeType, name: &str) -> String {
        format!("{source}:{node_type}:{name}")
    }
}

// ── Edge Types ────────────────────────────────────────────────────

/// The type of relationship between two nodes.
///
/// Orientation convention: `A —depends_on→ B` means A requires B to
/// function. Blast radius therefore traverses against arrow direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    DependsOn,
    RoutesTo,
    TerminatesTls,
    AuthenticatesWith,
    ResolvesTo,
    MemberOf,
    MountsSecret,
    ExposedBy,
    ConnectsTo,
    ManagedBy,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::DependsOn => "depends_on",
            EdgeType::RoutesTo => "routes_to",
            EdgeType::TerminatesTls => "terminates_tls",
            EdgeType::AuthenticatesWith => "authenticates_with",
            EdgeType::ResolvesTo => "resolves_to",
            EdgeType::MemberOf => "member_of",
            EdgeType::MountsSecret => "mounts_secret",
            EdgeType::ExposedBy => "exposed_by",
            EdgeType::ConnectsTo => "connects_to",
            EdgeType::ManagedBy => "managed_by",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depends_on" => Ok(EdgeType::DependsOn),
            "routes_to" => Ok(EdgeType::RoutesTo),
            "terminates_tls" => Ok(EdgeType::TerminatesTls),
            "authenticates_with" => Ok(EdgeType::AuthenticatesWith),
            "resolves_to" => Ok(EdgeType::ResolvesTo),
            "member_of" => Ok(EdgeType::MemberOf),
            "mounts_secret" => Ok(EdgeType::MountsSecret),
            "exposed_by" => Ok(EdgeType::ExposedBy),
            "connects_to" => Ok(EdgeType::ConnectsTo),
            "managed_by" => Ok(EdgeType::ManagedBy),
            other => Err(UnknownTypeError {
                kind: "edge",
                value: other.to_string(),
            }),
        }
    }
}

// ── Edge ──────────────────────────────────────────────────────────

/// A directed typed relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    /// Deterministic identity: `"<from_id>-><type>-><to_id>"`.
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Edge {
    /// Build an edge with its derived identity.
    pub fn new(from_id: &str, edge_type: EdgeType, to_id: &str) -> Self {
        Self {
            id: Self::make_id(from_id, edge_type, to_id),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            edge_type,
            metadata: BTreeMap::new(),
        }
    }

    /// The deterministic edge identity: `"<from_id>-><type>-><to_id>"`.
    pub fn make_id(from_id: &str, edge_type: EdgeType, to_id: &str) -> String {
        format!("{from_id}->{edge_type}->{to_id}")
    }
}

// ── Scan history ──────────────────────────────────────────────────

/// Lifecycle state of a scan record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(UnknownTypeError {
                kind: "scan status",
                value: other.to_string(),
            }),
        }
    }
}

/// One execution of a discovery pipeline, recorded in the scan history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    /// Monotonic integer assigned by the store; never reused.
    pub id: i64,
    pub source: String,
    pub source_path: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub nodes_found: i64,
    pub edges_found: i64,
    pub status: ScanStatus,
}
