//! Embedding provider trait and vector utilities.
//!
//! The [`EmbeddingProvider`] trait is the contract for text-embedding
//! backends; the concrete HTTP implementation lives in the application
//! crate. The helper functions cover vector serialization (little-endian
//! f32 blobs for SQLite storage) and cosine similarity.

use anyhow::Result;
use async_trait::async_trait;

/// Contract for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode a float vector as a BLOB of little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
