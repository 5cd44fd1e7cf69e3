//! Co-located vector index
//!
//! Embeddings live in `node_embeddings` / `edge_embeddings` inside the same
//! backend as the graph tables. Nearest-neighbour scans join each embedding
//! against its owner table, so an orphaned row (owner deleted, embedding not
//! yet) is never returned.

use std::sync::Arc;
use serde_json::Value;
use crate::storage::schema::{self, EmbeddingStatements};
use crate::storage::{SharedBackend, SqlRow, SqlValue, StoreLocation};
use crate::{Error, Result};
use super::index::{decode_vector, encode_vector, rank, DistanceMetric, EntityClass, SearchHit, VectorIndex};

pub struct SqlVectorIndex {
    backend: Arc<SharedBackend>,
    metric: DistanceMetric,
}

impl SqlVectorIndex {
    /// Attach to `backend`, creating the embedding tables if needed
    ///
    /// The graph tables are created too, since owner validation joins
    /// against them.
    pub fn new(backend: Arc<SharedBackend>, metric: DistanceMetric) -> Result<Self> {
        backend.with(|b| {
            b.execute_script(&schema::graph_schema())?;
            b.execute_script(&schema::embedding_schema())
        })?;
        Ok(Self { backend, metric })
    }

    fn statements(class: EntityClass) -> &'static EmbeddingStatements {
        match class {
            EntityClass::Node => &schema::NODE_EMBEDDINGS,
            EntityClass::Edge => &schema::EDGE_EMBEDDINGS,
        }
    }
}

impl VectorIndex for SqlVectorIndex {
    fn location(&self) -> &StoreLocation {
        self.backend.location()
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn insert(&self, class: EntityClass, sequence: i64, vector: &[f32], metadata: &Value) -> Result<()> {
        let stmts = Self::statements(class);
        let changed = self.backend.with(|b| {
            b.execute(
                stmts.insert,
                &[
                    sequence.into(),
                    SqlValue::Blob(encode_vector(vector)),
                    metadata.to_string().into(),
                ],
            )
        })?;

        if changed == 0 {
            return Err(Error::DuplicateEmbedding { class, sequence });
        }
        Ok(())
    }

    fn remove(&self, class: EntityClass, sequence: i64) -> Result<bool> {
        let stmts = Self::statements(class);
        let changed = self.backend.with(|b| b.execute(stmts.delete, &[sequence.into()]))?;
        Ok(changed > 0)
    }

    fn nearest(&self, class: EntityClass, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let stmts = Self::statements(class);
        let rows = self.backend.with(|b| b.query(stmts.scan_owned, &[]))?;

        let candidates = rows
            .iter()
            .map(row_to_candidate)
            .collect::<Result<Vec<_>>>()?;
        Ok(rank(candidates, query, k, self.metric))
    }

    fn sequences(&self, class: EntityClass) -> Result<Vec<i64>> {
        let stmts = Self::statements(class);
        let rows = self.backend.with(|b| b.query(stmts.sequences, &[]))?;
        rows.iter()
            .map(|row| {
                row.first()
                    .and_then(SqlValue::as_i64)
                    .ok_or_else(|| Error::CorruptRow(format!("bad embedding row: {:?}", row)))
            })
            .collect()
    }

    fn len(&self, class: EntityClass) -> Result<usize> {
        let stmts = Self::statements(class);
        let row = self.backend.with(|b| b.query_one(stmts.count, &[]))?;
        Ok(row.and_then(|r| r.first().and_then(SqlValue::as_i64)).unwrap_or(0) as usize)
    }
}

/// Decode a `seq, vector, metadata` row
fn row_to_candidate(row: &SqlRow) -> Result<(i64, Vec<f32>, Value)> {
    let corrupt = || Error::CorruptRow(format!("bad embedding row: {:?}", row));

    let sequence = row.first().and_then(SqlValue::as_i64).ok_or_else(corrupt)?;
    let vector = row.get(1).and_then(SqlValue::as_blob).map(decode_vector).ok_or_else(corrupt)?;
    let metadata = match row.get(2).and_then(SqlValue::as_str) {
        Some(text) => serde_json::from_str(text)?,
        None => Value::Null,
    };

    Ok((sequence, vector, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::storage::GraphStore;
    use serde_json::json;

    #[test]
    fn test_insert_search_remove() {
        let store = GraphStore::open_in_memory().unwrap();
        let index = SqlVectorIndex::new(store.backend().clone(), DistanceMetric::L2).unwrap();

        let a = store.insert_node(&Node::new(1, "n", json!({}))).unwrap().unwrap();
        let b = store.insert_node(&Node::new(2, "n", json!({}))).unwrap().unwrap();
        index.insert(EntityClass::Node, a, &[1.0, 0.0], &json!({"name": "a"})).unwrap();
        index.insert(EntityClass::Node, b, &[0.0, 1.0], &json!({"name": "b"})).unwrap();

        let hits = index.nearest(EntityClass::Node, &[0.9, 0.1], 5).unwrap();
        assert_eq!(hits[0].sequence, a);
        assert_eq!(hits[0].metadata, json!({"name": "a"}));
        assert_eq!(index.len(EntityClass::Node).unwrap(), 2);
        assert_eq!(index.len(EntityClass::Edge).unwrap(), 0);

        assert!(index.remove(EntityClass::Node, a).unwrap());
        assert!(!index.remove(EntityClass::Node, a).unwrap());
        assert_eq!(index.sequences(EntityClass::Node).unwrap(), vec![b]);
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let store = GraphStore::open_in_memory().unwrap();
        let index = SqlVectorIndex::new(store.backend().clone(), DistanceMetric::L2).unwrap();

        index.insert(EntityClass::Edge, 7, &[1.0], &json!(null)).unwrap();
        let err = index.insert(EntityClass::Edge, 7, &[2.0], &json!(null));
        assert!(matches!(err, Err(Error::DuplicateEmbedding { sequence: 7, .. })));
    }

    #[test]
    fn test_orphans_are_not_returned() {
        let store = GraphStore::open_in_memory().unwrap();
        let index = SqlVectorIndex::new(store.backend().clone(), DistanceMetric::L2).unwrap();

        let seq = store.insert_node(&Node::new(1, "n", json!({}))).unwrap().unwrap();
        index.insert(EntityClass::Node, seq, &[1.0], &json!(null)).unwrap();
        index.insert(EntityClass::Node, 99, &[1.0], &json!(null)).unwrap();

        let hits = index.nearest(EntityClass::Node, &[1.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.sequences(EntityClass::Node).unwrap(), vec![seq, 99]);
    }
}
