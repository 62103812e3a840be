//! Embedding-based guardrail relevance.
//!
//! Rule embeddings are cached by rule id in a grow-only map; the cache entry
//! is dropped when a rule is edited. An empty candidate list returns empty
//! without touching the embedder at all.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::embedder::{cosine_similarity, Embedder};

/// Cache statistics.
#[derive(Clone, Debug, Serialize)]
pub struct SemanticStats {
    /// Embeddings currently cached.
    pub cached_embeddings: usize,
    /// Whether an embedder is installed and ready.
    pub available: bool,
}

/// Ranks candidate rules against a prompt by cosine similarity.
pub struct SemanticMatcher {
    embedder: Option<Arc<dyn Embedder>>,
    cache: DashMap<i64, Vec<f32>>,
}

impl std::fmt::Debug for SemanticMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMatcher")
            .field("available", &self.available())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl SemanticMatcher {
    /// Matcher with no embedder; every query degrades to the keyword path.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            embedder: None,
            cache: DashMap::new(),
        }
    }

    /// Matcher over an embedder seam.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder: Some(embedder),
            cache: DashMap::new(),
        }
    }

    /// Whether semantic matching can run right now.
    #[must_use]
    pub fn available(&self) -> bool {
        self.embedder.as_ref().is_some_and(|e| e.is_ready())
    }

    /// Pre-compute and cache embeddings for `(rule_id, rule_text)` pairs.
    pub fn index(&self, rules: &[(i64, String)]) {
        let Some(embedder) = self.embedder.as_ref().filter(|e| e.is_ready()) else {
            return;
        };
        if rules.is_empty() {
            return;
        }
        for (id, text) in rules {
            if !self.cache.contains_key(id) {
                if let Some(embedding) = embedder.embed(text) {
                    let _ = self.cache.insert(*id, embedding);
                }
            }
        }
        info!(count = rules.len(), "guardrails indexed with embeddings");
    }

    /// Rank candidates against the prompt.
    ///
    /// Encodes the query once, computes cosine similarity against each
    /// candidate (encoding and caching on miss), filters by `threshold`,
    /// and returns the top `top_k` sorted by similarity descending with
    /// ties broken by rule id ascending.
    #[must_use]
    pub fn find_relevant(
        &self,
        prompt: &str,
        rules: &[(i64, String)],
        top_k: usize,
        threshold: f32,
    ) -> Vec<(i64, f32)> {
        if rules.is_empty() {
            return Vec::new();
        }
        let Some(embedder) = self.embedder.as_ref().filter(|e| e.is_ready()) else {
            return Vec::new();
        };
        let Some(prompt_embedding) = embedder.embed(prompt) else {
            return Vec::new();
        };

        let mut scores: Vec<(i64, f32)> = Vec::new();
        for (id, text) in rules {
            let similarity = if let Some(cached) = self.cache.get(id) {
                cosine_similarity(&prompt_embedding, &cached)
            } else if let Some(embedding) = embedder.embed(text) {
                let similarity = cosine_similarity(&prompt_embedding, &embedding);
                let _ = self.cache.insert(*id, embedding);
                similarity
            } else {
                continue;
            };
            if similarity >= threshold {
                scores.push((*id, similarity));
            }
        }

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scores.truncate(top_k);

        debug!(
            candidates = rules.len(),
            matches = scores.len(),
            top_score = scores.first().map_or(0.0, |s| s.1),
            "semantic matching complete"
        );

        scores
    }

    /// Drop the cached embedding for an edited rule.
    pub fn invalidate(&self, rule_id: i64) {
        let _ = self.cache.remove(&rule_id);
    }

    /// Drop every cached embedding.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> SemanticStats {
        SemanticStats {
            cached_embeddings: self.cache.len(),
            available: self.available(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
