//! The contract between the scanner and its source parsers.
//!
//! A parser is a format reader: given a path (or a live-pull label) it
//! produces nodes and edges satisfying the graph invariants, with
//! `source`, `source_file`, and `provider` already set. Everything else —
//! scan rows, persistence order, warning handling — is the scanner's job.

use async_trait::async_trait;

use atlas_core::{Edge, Node};

use crate::error::Result;
use crate::scanner::ScanOptions;

/// What one parser invocation produced.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub warnings: Vec<String>,
}

impl ParseResult {
    /// Fold another result into this one.
    pub fn merge(&mut self, other: ParseResult) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.warnings.extend(other.warnings);
    }
}

/// A discovery source format reader.
#[async_trait]
pub trait SourceParser: Send + Sync {
    /// Short source identifier ("terraform", "kubernetes", ...), also the
    /// dispatch key in the scanner registry.
    fn name(&self) -> &str;

    /// Cheap check whether this parser can handle the given path.
    fn supported(&self, path: &str) -> bool;

    /// Read one path into nodes and edges.
    async fn parse(&self, path: &str, options: &ScanOptions) -> Result<ParseResult>;
}
