//! # vectorgraph - dual-store graph with vector similarity
//!
//! Every node and edge carries a JSON attribute payload and a derived vector
//! embedding. The graph can be queried structurally (equality / LIKE / range
//! predicates over the payload) or by approximate nearest-neighbour search.
//!
//! vectorgraph provides:
//! - A relational graph store over a pluggable SQL [`storage::Backend`]
//!   (local SQLite, or networked libSQL with the `remote` feature)
//! - A vector index store that is either co-located in the same backend or
//!   held in a decoupled in-process index
//! - [`GraphDb`], the façade that keeps both stores consistent
//! - Single-hop traversal and connected-neighbourhood expansion
//! - Similarity-driven merging of near-duplicate nodes

pub mod node;
pub mod edge;
pub mod fragment;
pub mod storage;
pub mod query;
pub mod vector;
pub mod ontology;
pub mod graph;
pub mod merge;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use node::{Node, NodeId};
pub use edge::{Direction, Edge, EdgeRecord};
pub use fragment::GraphFragment;
pub use graph::{EdgeMatch, GraphDb, GraphStats, ImportReport, NodeMatch, RepairReport, SearchOptions, SearchResult};
pub use merge::{MergeOptions, MergeReport, NumericMerge};
pub use ontology::{OntologyValidator, RequiredKeysValidator, ValidationPolicy};
pub use query::{Clause, Condition, Joiner, Predicate, SearchMode, Traversal, Visit};
pub use storage::{EdgeFilter, GraphStore, SqliteBackend};
pub use vector::{DistanceMetric, EntityClass, SearchParams};
pub use config::GraphConfig;

/// Result type alias for vectorgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for vectorgraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Remote backend error: {0}")]
    Remote(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Label must not be empty")]
    EmptyLabel,

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Validation failed for resource type '{resource_type}'")]
    Validation { resource_type: String },

    #[error("Embedding for {class} sequence {sequence} already exists")]
    DuplicateEmbedding { class: EntityClass, sequence: i64 },
}
