//! ONNX Runtime embedder (feature-gated behind `ort`).
//!
//! Downloads `all-MiniLM-L6-v2` via `hf-hub`, tokenizes with `tokenizers`,
//! runs inference via `ort`, then applies mean pooling over non-padding
//! tokens and L2 normalization. Loaded lazily on the first embed call and
//! kept for the process lifetime; a failed load marks the embedder unready
//! and the matcher falls back to keyword scoring.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::embedder::Embedder;

/// Default model repository on the Hugging Face hub (~80 MB).
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// MiniLM hidden size.
pub const DIMENSIONS: usize = 384;

struct Loaded {
    session: ort::session::Session,
    tokenizer: tokenizers::Tokenizer,
}

/// Embedder backed by a local ONNX session.
pub struct OnnxEmbedder {
    model: String,
    cache_dir: Option<PathBuf>,
    loaded: Mutex<Option<Loaded>>,
    attempted: AtomicBool,
    failed: AtomicBool,
}

impl OnnxEmbedder {
    /// Embedder over the default MiniLM model.
    #[must_use]
    pub fn new() -> Self {
        Self::with_model(DEFAULT_MODEL, None)
    }

    /// Embedder over a specific hub model and cache directory.
    #[must_use]
    pub fn with_model(model: impl Into<String>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            model: model.into(),
            cache_dir,
            loaded: Mutex::new(None),
            attempted: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    fn ensure_loaded(&self) -> bool {
        if self.failed.load(Ordering::SeqCst) {
            return false;
        }
        let mut guard = self.loaded.lock();
        if guard.is_some() {
            return true;
        }
        if self.attempted.swap(true, Ordering::SeqCst) {
            // Another caller already tried and failed.
            return guard.is_some();
        }

        match self.load() {
            Ok(loaded) => {
                info!(model = %self.model, "embedding model loaded");
                *guard = Some(loaded);
                true
            }
            Err(e) => {
                warn!(model = %self.model, error = %e, "embedding model unavailable, semantic matching disabled");
                self.failed.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    fn load(&self) -> Result<Loaded, String> {
        let mut builder = hf_hub::api::sync::ApiBuilder::new();
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder.build().map_err(|e| format!("hf-hub api: {e}"))?;
        let repo = api.model(self.model.clone());

        let model_path = repo
            .get("onnx/model.onnx")
            .map_err(|e| format!("model download: {e}"))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| format!("tokenizer download: {e}"))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| format!("tokenizer load: {e}"))?;
        let session = ort::session::Session::builder()
            .map_err(|e| format!("session builder: {e}"))?
            .with_intra_threads(2)
            .map_err(|e| format!("thread config: {e}"))?
            .commit_from_file(&model_path)
            .map_err(|e| format!("model load: {e}"))?;

        Ok(Loaded { session, tokenizer })
    }
}

impl Default for OnnxEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for OnnxEmbedder {
    fn is_ready(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }

    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if !self.ensure_loaded() {
            return None;
        }
        let mut guard = self.loaded.lock();
        let loaded = guard.as_mut()?;

        let encoding = loaded.tokenizer.encode(text, true).ok()?;
        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let seq_len = ids.len();
        if seq_len == 0 {
            return None;
        }

        let input_ids: Vec<i64> = ids.iter().map(|&id| i64::from(id)).collect();
        let attention: Vec<i64> = mask.iter().map(|&m| i64::from(m)).collect();
        let token_type: Vec<i64> = vec![0; seq_len];
        let shape = vec![1i64, i64::try_from(seq_len).ok()?];

        let input_ids_tensor = ort::value::Tensor::from_array((shape.clone(), input_ids)).ok()?;
        let attention_tensor =
            ort::value::Tensor::from_array((shape.clone(), attention.clone())).ok()?;
        let token_type_tensor = ort::value::Tensor::from_array((shape, token_type)).ok()?;

        let outputs = loaded
            .session
            .run(ort::inputs![
                input_ids_tensor,
                attention_tensor,
                token_type_tensor
            ])
            .ok()?;

        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>().ok()?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| usize::try_from(d).unwrap_or(0)).collect();
        if dims.len() != 3 || dims[1] != seq_len {
            return None;
        }
        let hidden = dims[2];

        // Mean pooling over non-padding tokens.
        let mut pooled = vec![0.0f32; hidden];
        let mut count = 0.0f32;
        for (j, &m) in attention.iter().enumerate() {
            if m == 0 {
                continue;
            }
            count += 1.0;
            let base = j * hidden;
            for d in 0..hidden {
                pooled[d] += data[base + d];
            }
        }
        if count == 0.0 {
            return None;
        }
        for value in &mut pooled {
            *value /= count;
        }

        let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut pooled {
                *value /= norm;
            }
        }
        Some(pooled)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}
