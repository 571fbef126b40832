//! Whole-graph export serializers: JSON, Graphviz DOT, and Mermaid.
//!
//! Each function takes a [`GraphSnapshot`] (one consistent store read) and
//! produces a complete, self-contained document.

use std::collections::HashMap;
use std::fmt::Write;

use atlas_core::NodeType;
use atlas_store::GraphSnapshot;

/// Structured JSON: `{"nodes": [...], "edges": [...]}`.
pub fn to_json(snapshot: &GraphSnapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(snapshot)
}

/// Graphviz digraph with per-type node shapes and colors.
pub fn to_dot(snapshot: &GraphSnapshot) -> String {
    let mut out = String::new();
    out.push_str("digraph atlas {\n");
    out.push_str("    rankdir=LR;\n");
    out.push_str("    node [fontname=\"Helvetica\", style=filled];\n\n");

    for node in &snapshot.nodes {
        let _ = writeln!(
            out,
            "    \"{}\" [label=\"{}\\n({})\", shape={}, fillcolor=\"{}\"];",
            escape_dot(&node.id),
            escape_dot(&node.name),
            node.node_type,
            dot_shape(node.node_type),
            dot_color(node.node_type),
        );
    }

    out.push('\n');
    for edge in &snapshot.edges {
        let _ = writeln!(
            out,
            "    \"{}\" -> \"{}\" [label=\"{}\"];",
            escape_dot(&edge.from_id),
            escape_dot(&edge.to_id),
            edge.edge_type,
        );
    }

    out.push_str("}\n");
    out
}

/// Mermaid `graph LR` notation with short generated identifiers.
pub fn to_mermaid(snapshot: &GraphSnapshot) -> String {
    let mut out = String::new();
    out.push_str("graph LR\n");

    // Mermaid identifiers cannot carry the characters node ids use, so
    // each node gets a positional alias.
    let mut alias: HashMap<&str, String> = HashMap::new();
    for (i, node) in snapshot.nodes.iter().enumerate() {
        let short = format!("n{i}");
        let _ = writeln!(
            out,
            "    {short}[\"{} ({})\"]",
            escape_mermaid(&node.name),
            node.node_type,
        );
        alias.insert(node.id.as_str(), short);
    }

    for edge in &snapshot.edges {
        let (Some(from), Some(to)) = (
            alias.get(edge.from_id.as_str()),
            alias.get(edge.to_id.as_str()),
        ) else {
            continue;
        };
        let _ = writeln!(out, "    {from} -->|{}| {to}", edge.edge_type);
    }

    out
}

fn dot_shape(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Vm | NodeType::Container | NodeType::Pod | NodeType::ClusterNode => "box",
        NodeType::Database | NodeType::NosqlDb | NodeType::Bucket | NodeType::Disk => "cylinder",
        NodeType::LoadBalancer | NodeType::Ingress | NodeType::ApiGateway | NodeType::Cdn => {
            "diamond"
        }
        NodeType::Network | NodeType::Subnet | NodeType::Ip => "hexagon",
        NodeType::Certificate | NodeType::Secret | NodeType::KmsKey => "note",
        NodeType::FirewallRule
        | NodeType::IamBinding
        | NodeType::IamPolicy
        | NodeType::IamGroup
        | NodeType::ServiceAccount => "octagon",
        _ => "ellipse",
    }
}

fn dot_color(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Vm | NodeType::Container | NodeType::Pod | NodeType::ClusterNode => "#cfe2f3",
        NodeType::Database | NodeType::NosqlDb | NodeType::Bucket | NodeType::Disk => "#d9ead3",
        NodeType::LoadBalancer | NodeType::Ingress | NodeType::ApiGateway | NodeType::Cdn => {
            "#fff2cc"
        }
        NodeType::Network | NodeType::Subnet | NodeType::Ip => "#d0e0e3",
        NodeType::Certificate | NodeType::Secret | NodeType::KmsKey => "#f4cccc",
        NodeType::FirewallRule
        | NodeType::IamBinding
        | NodeType::IamPolicy
        | NodeType::IamGroup
        | NodeType::ServiceAccount => "#ead1dc",
        _ => "#ffffff",
    }
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "#quot;")
}
