//! Vector index abstraction and brute-force nearest-neighbour ranking

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::storage::StoreLocation;
use crate::{Error, Result};

/// Which kind of graph row an embedding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Node,
    Edge,
}

impl EntityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Node => "node",
            EntityClass::Edge => "edge",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance between two embeddings; smaller is nearer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean distance
    #[default]
    L2,
    /// `1 - cosine similarity`
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(Error::Config(format!("Unknown distance metric: {}", other))),
        }
    }
}

/// One nearest-neighbour result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Surrogate sequence of the owning graph row
    pub sequence: i64,
    pub distance: f32,
    /// The document that was embedded
    pub metadata: Value,
}

/// Storage and k-nearest retrieval of embeddings, per entity class
///
/// Implementations use interior locking so one index can be shared by
/// reference between the coordinator and the merge engine.
pub trait VectorIndex: Send + Sync {
    /// Identity token of the physical store holding the vectors
    fn location(&self) -> &StoreLocation;

    fn metric(&self) -> DistanceMetric;

    /// Append an embedding row; fails if `sequence` already has one
    fn insert(&self, class: EntityClass, sequence: i64, vector: &[f32], metadata: &Value) -> Result<()>;

    /// Delete an embedding row, reporting whether it existed
    fn remove(&self, class: EntityClass, sequence: i64) -> Result<bool>;

    /// The `k` nearest rows to `query`, nearest first, ties by sequence
    fn nearest(&self, class: EntityClass, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Every stored sequence, ascending
    fn sequences(&self, class: EntityClass) -> Result<Vec<i64>>;

    fn len(&self, class: EntityClass) -> Result<usize>;

    fn is_empty(&self, class: EntityClass) -> Result<bool> {
        Ok(self.len(class)? == 0)
    }
}

/// Brute-force k-nearest ranking over `(sequence, vector, metadata)` rows
///
/// Rows whose dimension differs from the query are skipped.
pub fn rank<I>(rows: I, query: &[f32], k: usize, metric: DistanceMetric) -> Vec<SearchHit>
where
    I: IntoIterator<Item = (i64, Vec<f32>, Value)>,
{
    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter_map(|(sequence, vector, metadata)| {
            if vector.len() != query.len() {
                tracing::debug!(
                    "Skipping embedding {} with dimension {} (query has {})",
                    sequence,
                    vector.len(),
                    query.len()
                );
                return None;
            }
            Some(SearchHit {
                sequence,
                distance: metric.distance(query, &vector),
                metadata,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then(a.sequence.cmp(&b.sequence))
    });
    hits.truncate(k);
    hits
}

/// Encode a vector as little-endian f32 bytes
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metrics() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!((DistanceMetric::L2.distance(&a, &b) - 2f32.sqrt()).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!(DistanceMetric::Cosine.distance(&a, &a).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.distance(&a, &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_rank_orders_and_breaks_ties_by_sequence() {
        let rows = vec![
            (3, vec![1.0, 0.0], json!(null)),
            (1, vec![0.0, 1.0], json!(null)),
            (2, vec![1.0, 0.0], json!(null)),
            (4, vec![1.0, 0.0, 0.0], json!(null)),
        ];
        let hits = rank(rows, &[1.0, 0.0], 2, DistanceMetric::L2);
        let seqs: Vec<i64> = hits.iter().map(|h| h.sequence).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn test_vector_blob_encoding() {
        let v = vec![0.5f32, -1.25, 3.0];
        let blob = encode_vector(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_vector(&blob), v);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
