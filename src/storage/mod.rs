//! Storage Layer - relational persistence behind a pluggable backend
//!
//! Tables:
//! - nodes(seq, id, label, body)
//! - edges(seq, source, target, label, properties)
//! - sequence_counters(entity, high_water)
//! - node_embeddings / edge_embeddings(seq, vector, metadata), when the
//!   vector index is co-located

pub mod backend;
pub mod schema;
pub mod sqlite;
#[cfg(feature = "remote")]
pub mod remote;
pub mod graph_store;

pub use backend::{Backend, SharedBackend, SqlRow, SqlValue, StoreLocation};
pub use graph_store::{EdgeFilter, GraphStore, RemovedNode, StoredNode, Upserted, UpsertedEdge};
pub use sqlite::SqliteBackend;
#[cfg(feature = "remote")]
pub use remote::RemoteBackend;
