//! Decoupled in-process vector index
//!
//! Holds embeddings in memory, independent of whichever backend the graph
//! store uses. It cannot see the graph tables, so its hits may reference rows
//! that were removed since; the coordinator validates them against the graph
//! store before trusting them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use serde_json::Value;
use crate::storage::StoreLocation;
use crate::{Error, Result};
use super::index::{rank, DistanceMetric, EntityClass, SearchHit, VectorIndex};

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    metadata: Value,
}

type Table = BTreeMap<i64, Entry>;

pub struct MemoryVectorIndex {
    location: StoreLocation,
    metric: DistanceMetric,
    tables: RwLock<HashMap<EntityClass, Table>>,
}

impl MemoryVectorIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        Self {
            location: StoreLocation::new("vectors", format!("memory:{}", NEXT.fetch_add(1, Ordering::Relaxed))),
            metric,
            tables: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

impl VectorIndex for MemoryVectorIndex {
    fn location(&self) -> &StoreLocation {
        &self.location
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn insert(&self, class: EntityClass, sequence: i64, vector: &[f32], metadata: &Value) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(class).or_default();

        if table.contains_key(&sequence) {
            return Err(Error::DuplicateEmbedding { class, sequence });
        }
        table.insert(
            sequence,
            Entry {
                vector: vector.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn remove(&self, class: EntityClass, sequence: i64) -> Result<bool> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get_mut(&class)
            .is_some_and(|table| table.remove(&sequence).is_some()))
    }

    fn nearest(&self, class: EntityClass, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get(&class) else {
            return Ok(Vec::new());
        };

        let rows = table
            .iter()
            .map(|(seq, entry)| (*seq, entry.vector.clone(), entry.metadata.clone()));
        Ok(rank(rows, query, k, self.metric))
    }

    fn sequences(&self, class: EntityClass) -> Result<Vec<i64>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&class)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default())
    }

    fn len(&self, class: EntityClass) -> Result<usize> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.get(&class).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classes_are_separate() {
        let index = MemoryVectorIndex::new(DistanceMetric::Cosine);
        index.insert(EntityClass::Node, 1, &[1.0, 0.0], &json!("n")).unwrap();
        index.insert(EntityClass::Edge, 1, &[0.0, 1.0], &json!("e")).unwrap();

        let hits = index.nearest(EntityClass::Edge, &[0.0, 1.0], 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata, json!("e"));
        assert!(index.nearest(EntityClass::Node, &[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_and_remove() {
        let index = MemoryVectorIndex::default();
        index.insert(EntityClass::Node, 4, &[1.0], &json!(null)).unwrap();
        assert!(index.insert(EntityClass::Node, 4, &[1.0], &json!(null)).is_err());

        assert!(index.remove(EntityClass::Node, 4).unwrap());
        assert!(!index.remove(EntityClass::Node, 4).unwrap());
        assert!(index.is_empty(EntityClass::Node).unwrap());
    }

    #[test]
    fn test_locations_are_distinct() {
        assert_ne!(MemoryVectorIndex::default().location(), MemoryVectorIndex::default().location());
    }
}
