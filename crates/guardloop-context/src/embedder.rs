//! The embedding seam.
//!
//! The semantic matcher only needs "text in, vector out"; which model (if
//! any) provides it is the embedder's concern. A missing or unready embedder
//! is never an error — callers fall back to keyword scoring.

use sha2::{Digest, Sha256};

/// Text-to-vector seam.
pub trait Embedder: Send + Sync {
    /// Whether the model is loaded and can embed.
    fn is_ready(&self) -> bool;

    /// Embed one text. `None` when the model is unavailable or fails.
    fn embed(&self, text: &str) -> Option<Vec<f32>>;

    /// Output dimensionality.
    fn dimensions(&self) -> usize;
}

/// Cosine similarity of two equal-length vectors; 0 for degenerate input.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Deterministic hashing embedder.
///
/// Buckets each lower-cased token into a fixed-width vector by SHA-256, so
/// texts sharing vocabulary land near each other. No model download, fully
/// reproducible; used by tests and as a stand-in when the ONNX feature is
/// not compiled in.
#[derive(Clone, Copy, Debug)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl HashEmbedder {
    /// Hashing embedder with the default 64 dimensions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Embedder for HashEmbedder {
    fn is_ready(&self) -> bool {
        true
    }

    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = usize::from(digest[0]) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Some(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        assert_eq!(embedder.embed("same text"), embedder.embed("same text"));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new();
        let auth1 = embedder.embed("always validate jwt tokens").unwrap();
        let auth2 = embedder.embed("validate jwt tokens on login").unwrap();
        let other = embedder.embed("render the sidebar with css").unwrap();

        assert!(cosine_similarity(&auth1, &auth2) > cosine_similarity(&auth1, &other));
    }

    #[test]
    fn embeddings_are_unit_norm() {
        let v = HashEmbedder::new().embed("a b c d").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
