//! Vector Index Store - provider + index
//!
//! Derives embeddings from attribute documents and answers similarity
//! queries. A search returns `None` when there is nothing to compare (the
//! index holds no rows for the class, or the query produced no embedding),
//! and `Some(vec![])` when rows exist but none pass the threshold.

use std::cmp::Ordering;
use std::sync::Arc;
use serde_json::Value;
use crate::Result;
use crate::storage::StoreLocation;
use super::embedding::EmbeddingProvider;
use super::index::{EntityClass, SearchHit, VectorIndex};

/// Parameters of one similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Number of nearest rows to fetch
    pub k: usize,
    /// Drop hits farther than this
    pub threshold: Option<f32>,
    /// Re-order hits by this metadata field instead of distance
    pub sort_key: Option<String>,
    /// Reverse the `sort_key` order; nearest-first is kept without a sort key
    pub descending: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 10,
            threshold: None,
            sort_key: None,
            descending: false,
        }
    }
}

impl SearchParams {
    pub fn nearest(k: usize) -> Self {
        Self { k, ..Self::default() }
    }
}

pub struct VectorStore {
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl VectorStore {
    pub fn new(index: Arc<dyn VectorIndex>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, provider }
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn location(&self) -> &StoreLocation {
        self.index.location()
    }

    /// Embed a document: strings are embedded as-is, anything else as its JSON text
    pub fn embed_document(&self, document: &Value) -> Result<Vec<f32>> {
        match document {
            Value::String(text) => self.provider.embed(text),
            other => self.provider.embed(&other.to_string()),
        }
    }

    /// Embed `document` and store it under `sequence`
    ///
    /// Returns `false` without writing when the provider yields no embedding.
    pub fn add_embedding(&self, class: EntityClass, sequence: i64, document: &Value) -> Result<bool> {
        let vector = self.embed_document(document)?;
        if vector.is_empty() {
            tracing::debug!("No embedding produced for {} {}", class, sequence);
            return Ok(false);
        }

        self.index.insert(class, sequence, &vector, document)?;
        Ok(true)
    }

    pub fn remove_embedding(&self, class: EntityClass, sequence: i64) -> Result<bool> {
        self.index.remove(class, sequence)
    }

    pub fn search(&self, class: EntityClass, query: &Value, params: &SearchParams) -> Result<Option<Vec<SearchHit>>> {
        if self.index.is_empty(class)? {
            return Ok(None);
        }

        let vector = self.embed_document(query)?;
        if vector.is_empty() {
            return Ok(None);
        }

        let mut hits = self.index.nearest(class, &vector, params.k)?;

        if let Some(threshold) = params.threshold {
            hits.retain(|hit| hit.distance <= threshold);
        }

        if let Some(key) = &params.sort_key {
            hits.sort_by(|a, b| compare_values(a.metadata.get(key), b.metadata.get(key)));
            if params.descending {
                hits.reverse();
            }
        }

        Ok(Some(hits))
    }

    pub fn count(&self, class: EntityClass) -> Result<usize> {
        self.index.len(class)
    }
}

/// Order metadata values: numbers numerically, strings lexically, missing last
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{DistanceMetric, HashEmbeddingProvider, MemoryVectorIndex, NullEmbeddingProvider};
    use serde_json::json;

    fn store() -> VectorStore {
        VectorStore::new(
            Arc::new(MemoryVectorIndex::new(DistanceMetric::L2)),
            Arc::new(HashEmbeddingProvider::default()),
        )
    }

    #[test]
    fn test_empty_index_is_none() {
        let store = store();
        assert!(store.search(EntityClass::Node, &json!("anything"), &SearchParams::default()).unwrap().is_none());
    }

    #[test]
    fn test_exact_document_is_top_hit() {
        let store = store();
        let docs = [
            json!({"id": 1, "name": "red apple"}),
            json!({"id": 2, "name": "green pear"}),
            json!({"id": 3, "name": "blue sky"}),
        ];
        for (i, doc) in docs.iter().enumerate() {
            assert!(store.add_embedding(EntityClass::Node, i as i64 + 1, doc).unwrap());
        }

        let query = Value::String(docs[1].to_string());
        let hits = store.search(EntityClass::Node, &query, &SearchParams::nearest(3)).unwrap().unwrap();
        assert_eq!(hits[0].sequence, 2);
        assert!(hits[0].distance.abs() < 1e-5);
        assert_eq!(hits[0].metadata, docs[1]);
    }

    #[test]
    fn test_threshold_and_sort_key() {
        let store = store();
        store.add_embedding(EntityClass::Edge, 1, &json!({"w": 3, "t": "a b c"})).unwrap();
        store.add_embedding(EntityClass::Edge, 2, &json!({"w": 1, "t": "a b c"})).unwrap();
        store.add_embedding(EntityClass::Edge, 3, &json!({"w": 2, "t": "x y z"})).unwrap();

        let none_pass = SearchParams {
            threshold: Some(-1.0),
            ..SearchParams::nearest(3)
        };
        let hits = store.search(EntityClass::Edge, &json!("a b c"), &none_pass).unwrap();
        assert_eq!(hits, Some(vec![]));

        let by_weight = SearchParams {
            sort_key: Some("w".to_string()),
            descending: true,
            ..SearchParams::nearest(3)
        };
        let hits = store.search(EntityClass::Edge, &json!("a b c"), &by_weight).unwrap().unwrap();
        let weights: Vec<i64> = hits.iter().map(|h| h.metadata["w"].as_i64().unwrap()).collect();
        assert_eq!(weights, vec![3, 2, 1]);
    }

    #[test]
    fn test_descending_needs_sort_key() {
        let store = store();
        store.add_embedding(EntityClass::Node, 1, &json!("a b c")).unwrap();
        store.add_embedding(EntityClass::Node, 2, &json!("x y z")).unwrap();

        let params = SearchParams {
            descending: true,
            ..SearchParams::nearest(2)
        };
        let hits = store.search(EntityClass::Node, &json!("a b c"), &params).unwrap().unwrap();
        assert_eq!(hits[0].sequence, 1);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_no_embedding_data() {
        let store = VectorStore::new(Arc::new(MemoryVectorIndex::default()), Arc::new(NullEmbeddingProvider));
        assert!(!store.add_embedding(EntityClass::Node, 1, &json!({"a": 1})).unwrap());
        assert_eq!(store.count(EntityClass::Node).unwrap(), 0);
    }
}
