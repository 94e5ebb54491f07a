use crate::error::{Error, Result};

/// A text to fixed-dimension vector capability.
///
/// Implementations must return exactly one vector per input text, in input
/// order, all of length [`Embedder::dimension`].
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text. Equivalent to `embed_batch(&[text])[0]`.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Embedding("embedder returned no vector".to_string())
            })
    }
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed_one(text)
    }
}

/// Check an embedder's output before anything is indexed from it.
///
/// Fails with [`Error::Embedding`] if the batch has the wrong length, any
/// vector has the wrong dimension, or any component is NaN or infinite.
pub fn validate_batch(
    vectors: &[Vec<f32>],
    expected_len: usize,
    dimension: usize,
) -> Result<()> {
    if vectors.len() != expected_len {
        return Err(Error::Embedding(format!(
            "expected {expected_len} vectors, got {}",
            vectors.len()
        )));
    }

    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(Error::Embedding(format!(
                "vector {i} has dimension {}, expected {dimension}",
                vector.len()
            )));
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(Error::Embedding(format!(
                "vector {i} has a non-finite value at component {pos}"
            )));
        }
    }

    Ok(())
}

/// Embed a batch and validate the result against the embedder's dimension.
pub fn embed_checked(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed_batch(texts)?;
    validate_batch(&vectors, texts.len(), embedder.dimension())?;
    Ok(vectors)
}

/// Embed a single text and validate the result.
pub fn embed_one_checked(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vector = embedder.embed_one(text)?;
    validate_batch(std::slice::from_ref(&vector), 1, embedder.dimension())?;
    Ok(vector)
}

/// Default dimension of [`HashingEmbedder`].
pub const DEFAULT_HASHING_DIMENSION: usize = 256;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Fixed algorithm, so bucket assignments never change
/// between builds.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// A deterministic, model-free embedder.
///
/// Each lowercased word is hashed with FNV-1a into one of `dimension`
/// buckets and the resulting count vector is L2-normalized, so texts sharing
/// vocabulary end up close together. Vectors are identical across builds and
/// platforms. Useful offline and in tests; it has no notion of
/// meaning beyond word overlap.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text.split_whitespace() {
            let word: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() {
                continue;
            }
            let bucket = (fnv1a(word.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_well_formed_batch() {
        let vectors = vec![vec![0.0, 1.0], vec![2.5, -1.0]];
        assert!(validate_batch(&vectors, 2, 2).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_count() {
        let err = validate_batch(&[vec![1.0]], 2, 1).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn validate_rejects_wrong_dimension() {
        let err = validate_batch(&[vec![1.0, 2.0], vec![1.0]], 2, 2).unwrap_err();
        assert!(err.to_string().contains("vector 1 has dimension 1"));
    }

    #[test]
    fn validate_rejects_non_finite() {
        let err = validate_batch(&[vec![1.0, f32::NAN]], 1, 2).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        let err = validate_batch(&[vec![f32::INFINITY]], 1, 1).unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let a = embedder.embed_one("Rust is fast").unwrap();
        let b = embedder.embed_one("rust IS fast!").unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), FNV_OFFSET_BASIS);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn hashing_embedder_buckets_are_stable() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let v = embedder.embed_one("Rust").unwrap();
        assert_eq!(v[7], 1.0);
        assert_eq!(v.iter().filter(|x| **x != 0.0).count(), 1);
    }

    #[test]
    fn hashing_embedder_is_normalized() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed_one("some words to embed").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8).unwrap();
        let v = embedder.embed_one("  ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn hashing_embedder_batch_matches_one() {
        let embedder = HashingEmbedder::new(32).unwrap();
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed_one("gamma").unwrap());
    }

    #[test]
    fn zero_dimension_rejected() {
        assert!(matches!(
            HashingEmbedder::new(0).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn embed_checked_skips_empty_batch() {
        let embedder = HashingEmbedder::new(4).unwrap();
        assert!(embed_checked(&embedder, &[]).unwrap().is_empty());
    }
}
