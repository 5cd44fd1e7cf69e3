//! Vector Index Store
//!
//! Embedding rows are keyed by the surrogate sequence of their owning graph
//! row, one table per [`EntityClass`]. The backing [`VectorIndex`] is either
//! co-located with the graph store ([`SqlVectorIndex`], same backend) or
//! decoupled from it ([`MemoryVectorIndex`]).

pub mod embedding;
pub mod index;
pub mod memory;
pub mod sql;
pub mod store;

pub use embedding::{EmbeddingProvider, HashEmbeddingProvider, NullEmbeddingProvider};
#[cfg(feature = "fastembed")]
pub use embedding::FastEmbedProvider;
pub use index::{DistanceMetric, EntityClass, SearchHit, VectorIndex};
pub use memory::MemoryVectorIndex;
pub use sql::SqlVectorIndex;
pub use store::{SearchParams, VectorStore};
