//! Read-side certificate tracking over the store.

use chrono::Utc;
use serde::Serialize;

use atlas_core::{Node, NodeType};
use atlas_store::{AssetStore, NodeFilter};

use crate::error::Result;
use crate::status::{classify_days, days_until, CertStatus};

/// A certificate node with its computed lifetime classification.
#[derive(Debug, Clone, Serialize)]
pub struct CertRecord {
    pub node: Node,
    pub days_remaining: Option<i64>,
    pub status: CertStatus,
}

impl CertRecord {
    fn from_node(node: Node) -> Self {
        let now = Utc::now();
        let days_remaining = node.expires_at.map(|exp| days_until(now, exp));
        let status = days_remaining.map_or(CertStatus::Unknown, classify_days);
        Self {
            node,
            days_remaining,
            status,
        }
    }
}

/// All certificate nodes in the graph, classified.
pub async fn list_certs(store: &AssetStore) -> Result<Vec<CertRecord>> {
    let nodes = store
        .list_nodes(&NodeFilter {
            node_type: Some(NodeType::Certificate),
            ..Default::default()
        })
        .await?;

    Ok(nodes.into_iter().map(CertRecord::from_node).collect())
}

/// Certificates expiring within the next `days` days, soonest first.
pub async fn expiring_certs(store: &AssetStore, days: i64) -> Result<Vec<CertRecord>> {
    let nodes = store.expiring_nodes(days).await?;
    Ok(nodes.into_iter().map(CertRecord::from_node).collect())
}

/// TLS endpoints implied by the graph: ingress hosts, load balancer
/// addresses, and DNS record names, each as `host:443`. Duplicates are
/// removed preserving first-seen order.
pub async fn discover_endpoints(store: &AssetStore) -> Result<Vec<String>> {
    let mut endpoints = Vec::new();

    let ingresses = store
        .list_nodes(&NodeFilter {
            node_type: Some(NodeType::Ingress),
            ..Default::default()
        })
        .await?;
    for node in &ingresses {
        for key in ["host", "hostname"] {
            if let Some(host) = node.metadata.get(key) {
                if !host.is_empty() {
                    endpoints.push(format!("{host}:443"));
                }
            }
        }
    }

    let load_balancers = store
        .list_nodes(&NodeFilter {
            node_type: Some(NodeType::LoadBalancer),
            ..Default::default()
        })
        .await?;
    for node in &load_balancers {
        if let Some(ip) = node.metadata.get("ip_address") {
            if !ip.is_empty() {
                endpoints.push(format!("{ip}:443"));
            }
        }
    }

    let dns_records = store
        .list_nodes(&NodeFilter {
            node_type: Some(NodeType::DnsRecord),
            ..Default::default()
        })
        .await?;
    for node in &dns_records {
        if !node.name.is_empty() {
            endpoints.push(format!("{}:443", node.name));
        }
    }

    let mut seen = std::collections::HashSet::new();
    endpoints.retain(|e| seen.insert(e.clone()));
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cert_node(name: &str, days: i64) -> Node {
        let mut node = Node::new("probe", NodeType::Certificate, name);
        node.expires_at = Some(Utc::now() + Duration::days(days) + Duration::hours(1));
        node
    }

    #[tokio::test]
    async fn list_certs_classifies_each_node() {
        let store = AssetStore::open_in_memory().await.unwrap();
        store.upsert_node(&cert_node("soon", 5)).await.unwrap();
        store.upsert_node(&cert_node("midterm", 20)).await.unwrap();
        store.upsert_node(&cert_node("healthy", 90)).await.unwrap();

        let mut no_expiry = Node::new("tf", NodeType::Certificate, "opaque");
        no_expiry.expires_at = None;
        store.upsert_node(&no_expiry).await.unwrap();

        let records = list_certs(&store).await.unwrap();
        assert_eq!(records.len(), 4);

        let by_name = |name: &str| {
            records
                .iter()
                .find(|r| r.node.name == name)
                .unwrap()
                .status
        };
        assert_eq!(by_name("soon"), CertStatus::Critical);
        assert_eq!(by_name("midterm"), CertStatus::Warning);
        assert_eq!(by_name("healthy"), CertStatus::Ok);
        assert_eq!(by_name("opaque"), CertStatus::Unknown);
    }

    #[tokio::test]
    async fn expiring_certs_respects_window() {
        let store = AssetStore::open_in_memory().await.unwrap();
        store.upsert_node(&cert_node("in-five", 5)).await.unwrap();

        let month = expiring_certs(&store, 30).await.unwrap();
        assert_eq!(month.len(), 1);
        assert_eq!(month[0].status, CertStatus::Critical);

        let three_days = expiring_certs(&store, 3).await.unwrap();
        assert!(three_days.is_empty());
    }

    #[tokio::test]
    async fn endpoint_discovery_covers_all_sources_and_dedups() {
        let store = AssetStore::open_in_memory().await.unwrap();

        let mut ingress = Node::new("k8s", NodeType::Ingress, "web");
        ingress
            .metadata
            .insert("host".to_string(), "app.example.com".to_string());
        ingress
            .metadata
            .insert("hostname".to_string(), "app.example.com".to_string());
        store.upsert_node(&ingress).await.unwrap();

        let mut lb = Node::new("tf", NodeType::LoadBalancer, "edge");
        lb.metadata
            .insert("ip_address".to_string(), "203.0.113.9".to_string());
        store.upsert_node(&lb).await.unwrap();

        store
            .upsert_node(&Node::new("tf", NodeType::DnsRecord, "api.example.com"))
            .await
            .unwrap();

        // Not a TLS endpoint source.
        store
            .upsert_node(&Node::new("tf", NodeType::Database, "users"))
            .await
            .unwrap();

        let endpoints = discover_endpoints(&store).await.unwrap();
        assert_eq!(
            endpoints,
            vec![
                "app.example.com:443".to_string(),
                "203.0.113.9:443".to_string(),
                "api.example.com:443".to_string(),
            ]
        );
    }
}
