//! Error types for the atlas-engine crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("no path between {from} and {to}")]
    NoPath { from: String, to: String },

    #[error("store error: {0}")]
    Store(#[from] atlas_store::StoreError),

    #[error("graph error: {0}")]
    Graph(#[from] atlas_graph::GraphError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
