//! Embedding service trait and the built-in hashing embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::{EmbeddingError, Result};
use crate::normalize::l2_normalize;

/// Turns text into fixed-size vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts, one vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed one text.
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Internal("embedder returned no vectors".into()))
    }

    /// Whether the service can embed right now.
    fn is_ready(&self) -> bool;

    /// Output dimensions.
    fn dimensions(&self) -> usize;
}

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of
/// `dimensions` buckets; the bucket counts are L2-normalized. Texts sharing
/// vocabulary score high under cosine similarity, unrelated texts near zero.
#[derive(Clone, Debug)]
pub struct HashingEmbeddingService {
    dimensions: usize,
}

impl HashingEmbeddingService {
    /// Create an embedder with `dimensions` buckets (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize;
            v[bucket] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingService for HashingEmbeddingService {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
