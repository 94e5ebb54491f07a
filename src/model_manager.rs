use std::sync::{Mutex, OnceLock, PoisonError};

use candle_core::{DType, Device, Tensor};
use pylate_rs::ColBERT;

use crate::{
    embedding::Embedder,
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "DOCRAG_MODEL";

/// Reported dimension when the model cannot be loaded to measure it.
pub const DEFAULT_COLBERT_DIMENSION: usize = 128;

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

fn map_candle_err(e: candle_core::Error) -> Error {
    Error::Embedding(format!("tensor computation error: {e}"))
}

/// Produces ColBERT token embeddings for a batch of texts.
pub trait TokenEncoder: Send {
    /// Encode texts into token embeddings of shape
    /// `[batch, tokens, dimension]`.
    fn encode_documents(&mut self, texts: &[String]) -> Result<Tensor>;
}

/// Manages the ColBERT model lifecycle, supporting lazy loading on first use.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl ModelManager {
    /// Creates a `ModelManager` for `model_id`, a HuggingFace Hub ID or a
    /// local model path. The model is not loaded until the first encode call.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    /// Returns the model ID that will be (or has been) loaded.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Returns `true` if the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            tracing::info!(model = %self.model_id, "loading embedding model");
            let colbert: ColBERT = ColBERT::from(&self.model_id)
                .with_device(default_device())
                .try_into()
                .map_err(|e| {
                    Error::Embedding(format!(
                        "failed to load model {}: {e}",
                        self.model_id
                    ))
                })?;
            self.model = Some(colbert);
        }

        self.model.as_mut().ok_or_else(|| {
            Error::Embedding("model not loaded".to_string())
        })
    }
}

impl TokenEncoder for ModelManager {
    /// Queries and chunks both go through the document prompt, so a text
    /// encodes the same way whichever side it is on.
    fn encode_documents(&mut self, texts: &[String]) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        model
            .encode(texts, false)
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}

/// Collapse `[batch, tokens, dimension]` token embeddings into one
/// L2-normalized vector per batch entry by averaging over tokens.
fn mean_pool(embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    let (_batch, tokens, _dimension) =
        embeddings.dims3().map_err(|e| {
            Error::Embedding(format!("unexpected embedding tensor shape: {e}"))
        })?;
    if tokens == 0 {
        return Err(Error::Embedding(
            "model produced no token embeddings".to_string(),
        ));
    }

    let pooled = embeddings
        .to_dtype(DType::F32)
        .and_then(|t| t.mean(1))
        .and_then(|t| t.to_device(&Device::Cpu))
        .and_then(|t| t.to_vec2::<f32>())
        .map_err(map_candle_err)?;

    Ok(pooled
        .into_iter()
        .map(|mut v| {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.iter_mut().for_each(|x| *x /= norm);
            }
            v
        })
        .collect())
}

/// Text encoded once to learn the model's output width.
const DIMENSION_PROBE: &str = "dimension";

/// An [`Embedder`] backed by a ColBERT model.
///
/// ColBERT produces one vector per token; this pools them into a single
/// vector per text. The vector dimension is whatever the model emits: it is
/// recorded from the first encoded batch, or from a one-word encode if
/// [`Embedder::dimension`] is asked first.
pub struct ColbertEmbedder<E = ModelManager> {
    encoder: Mutex<E>,
    dimension: OnceLock<usize>,
}

impl<E: TokenEncoder> ColbertEmbedder<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder: Mutex::new(encoder),
            dimension: OnceLock::new(),
        }
    }

    /// Pin the dimension instead of learning it. Output of any other width
    /// then fails validation.
    pub fn with_dimension(encoder: E, dimension: usize) -> Self {
        let pinned = OnceLock::new();
        pinned.get_or_init(|| dimension);
        Self {
            encoder: Mutex::new(encoder),
            dimension: pinned,
        }
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self
            .encoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encode_documents(texts)?;
        let pooled = mean_pool(&embeddings)?;
        if let Some(first) = pooled.first() {
            self.dimension.get_or_init(|| first.len());
        }
        Ok(pooled)
    }
}

impl ColbertEmbedder<ModelManager> {
    pub fn model_id(&self) -> String {
        self.encoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .model_id()
            .to_string()
    }
}

impl<E: TokenEncoder> Embedder for ColbertEmbedder<E> {
    fn dimension(&self) -> usize {
        if let Some(dimension) = self.dimension.get() {
            return *dimension;
        }
        if let Err(e) = self.encode(&[DIMENSION_PROBE.to_string()]) {
            tracing::warn!("could not determine embedding dimension: {e}");
        }
        self.dimension
            .get()
            .copied()
            .unwrap_or(DEFAULT_COLBERT_DIMENSION)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.encode(texts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        Chunker,
        CorpusManager,
        Document,
        InMemorySource,
        chunking::ChunkingConfig,
        embedding::embed_checked,
    };

    /// Emits two token vectors per text, derived only from that text's bytes.
    struct FixedEncoder {
        dimension: usize,
        calls: usize,
    }

    impl FixedEncoder {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                calls: 0,
            }
        }
    }

    impl TokenEncoder for FixedEncoder {
        fn encode_documents(&mut self, texts: &[String]) -> Result<Tensor> {
            self.calls += 1;
            let mut data = Vec::with_capacity(texts.len() * 2 * self.dimension);
            for text in texts {
                let seed: usize = text.bytes().map(usize::from).sum();
                for token in 0..2 {
                    for d in 0..self.dimension {
                        data.push(((seed + token * 3 + d) % 7 + 1) as f32);
                    }
                }
            }
            Tensor::from_vec(data, (texts.len(), 2, self.dimension), &Device::Cpu)
                .map_err(map_candle_err)
        }
    }

    #[test]
    fn custom_model_id() {
        let manager = ModelManager::with_model_id("custom/model".to_string());
        assert_eq!(manager.model_id(), "custom/model");
        assert!(!manager.is_loaded());
    }

    #[test]
    fn embedder_does_not_load_eagerly() {
        let embedder = ColbertEmbedder::new(ModelManager::with_model_id(
            DEFAULT_MODEL_ID.to_string(),
        ));
        assert_eq!(embedder.model_id(), DEFAULT_MODEL_ID);
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
        assert!(!embedder.encoder.lock().unwrap().is_loaded());
    }

    #[test]
    fn embed_one_matches_batch_entry() {
        let embedder = ColbertEmbedder::new(FixedEncoder::new(4));
        let batch = embedder
            .embed_batch(&["alpha".to_string(), "beta gamma".to_string()])
            .unwrap();
        let one = embedder.embed_one("beta gamma").unwrap();

        assert_eq!(one.len(), batch[1].len());
        for (a, b) in one.iter().zip(&batch[1]) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn dimension_is_learned_from_output() {
        let embedder = ColbertEmbedder::new(FixedEncoder::new(5));
        embedder.embed_batch(&["hello".to_string()]).unwrap();
        assert_eq!(embedder.dimension(), 5);
        // Already known; no extra encode.
        assert_eq!(embedder.encoder.lock().unwrap().calls, 1);
    }

    #[test]
    fn dimension_asked_first_encodes_once() {
        let embedder = ColbertEmbedder::new(FixedEncoder::new(3));
        assert_eq!(embedder.dimension(), 3);
        assert_eq!(embedder.dimension(), 3);
        assert_eq!(embedder.encoder.lock().unwrap().calls, 1);
    }

    #[test]
    fn pinned_dimension_rejects_other_widths() {
        let embedder = ColbertEmbedder::with_dimension(FixedEncoder::new(5), 7);
        let err = embed_checked(&embedder, &["hello".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn corpus_loads_with_non_default_width() {
        let corpus = CorpusManager::new(
            Arc::new(ColbertEmbedder::new(FixedEncoder::new(5))),
            Chunker::new(ChunkingConfig::new(2, 0).unwrap()),
        );
        let source = InMemorySource::new(vec![Document::new(
            "notes.txt",
            "tensors flow through layers",
        )]);

        let report = corpus.load(&source).unwrap();
        assert_eq!(report.dimension, 5);
        assert_eq!(report.chunks, 2);

        let hits = corpus
            .retrieve_with("tensors flow", crate::corpus::RetrieveOptions::new(1))
            .unwrap();
        assert_eq!(hits[0].text, "tensors flow");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn mean_pool_averages_tokens() {
        // batch=1, tokens=2, dim=2: [[3, 0], [1, 0]] -> mean [2, 0] -> [1, 0]
        let t = Tensor::from_vec(vec![3.0f32, 0.0, 1.0, 0.0], (1, 2, 2), &Device::Cpu)
            .unwrap();
        let pooled = mean_pool(&t).unwrap();
        assert_eq!(pooled, vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn mean_pool_keeps_batch_order() {
        let t = Tensor::from_vec(
            vec![0.0f32, 2.0, 0.0, 4.0, 5.0, 0.0, 1.0, 0.0],
            (2, 2, 2),
            &Device::Cpu,
        )
        .unwrap();
        let pooled = mean_pool(&t).unwrap();
        assert_eq!(pooled, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn mean_pool_rejects_wrong_rank() {
        let t = Tensor::from_vec(vec![1.0f32, 2.0], (1, 2), &Device::Cpu).unwrap();
        assert!(matches!(mean_pool(&t).unwrap_err(), Error::Embedding(_)));
    }
}
