//! Embedding providers - turn text into vectors
//!
//! A provider may return an empty vector when it has nothing to offer (e.g.
//! unconfigured); callers treat that as "no similarity data", never as a
//! zero vector.

use crate::Result;

pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed output dimension (0 if the provider never produces vectors)
    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Deterministic bag-of-tokens embedding using feature hashing
///
/// Text is split on non-alphanumeric characters and lowercased; each token
/// adds ±1 to a bucket chosen by its blake3 hash, and the result is
/// L2-normalized. Texts sharing most tokens land close together, which is
/// enough for deduplication and tests without a model download.
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;

        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();

            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

            vector[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Ok(Vec::new());
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Ok(Vec::new());
        }
        for x in &mut vector {
            *x /= norm;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Provider for stores configured without embeddings
pub struct NullEmbeddingProvider;

impl EmbeddingProvider for NullEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(Vec::new())
    }

    fn dimension(&self) -> usize {
        0
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(feature = "fastembed")]
pub use self::fastembed_provider::FastEmbedProvider;

#[cfg(feature = "fastembed")]
mod fastembed_provider {
    use std::sync::{Mutex, PoisonError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use crate::{Error, Result};
    use super::EmbeddingProvider;

    /// Local transformer model (all-MiniLM-L6-v2, 384 dimensions)
    pub struct FastEmbedProvider {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedProvider {
        /// Load the default model, downloading it on first use
        pub fn new() -> Result<Self> {
            let mut options = InitOptions::default();
            options.model_name = EmbeddingModel::AllMiniLML6V2;
            options.show_download_progress = true;

            let model = TextEmbedding::try_new(options)
                .map_err(|e| Error::Embedding(format!("Failed to load embedding model: {}", e)))?;

            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
            let mut embeddings = model
                .embed(vec![text.to_string()], None)
                .map_err(|e| Error::Embedding(format!("Embedding generation failed: {}", e)))?;

            Ok(embeddings.pop().unwrap_or_default())
        }

        fn dimension(&self) -> usize {
            384
        }

        fn name(&self) -> &str {
            "fastembed"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::DistanceMetric;

    #[test]
    fn test_hash_embedding_is_deterministic_and_normalized() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed("Hello, graph world").unwrap();
        let b = provider.embed("hello graph WORLD").unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_texts_are_nearer() {
        let provider = HashEmbeddingProvider::default();
        let base = provider.embed("{\"id\":1,\"x\":1}").unwrap();
        let near = provider.embed("{\"id\":2,\"x\":1}").unwrap();
        let far = provider.embed("{\"id\":3,\"name\":\"alpha beta\"}").unwrap();

        let metric = DistanceMetric::L2;
        assert!(metric.distance(&base, &near) < metric.distance(&base, &far));
    }

    #[test]
    fn test_empty_text_has_no_embedding() {
        assert!(HashEmbeddingProvider::default().embed(" ,;{} ").unwrap().is_empty());
        assert!(NullEmbeddingProvider.embed("anything").unwrap().is_empty());
    }
}
