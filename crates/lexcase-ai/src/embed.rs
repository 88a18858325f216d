//! The embedding boundary.
//!
//! Anything that turns text into a fixed-dimension vector implements
//! [`Embed`]. Implementations must be deterministic: identical text yields an
//! identical vector, which keeps retrieval reproducible.

use lexcase_core::EmbeddingError;

pub trait Embed: Send + Sync {
    /// Output dimensionality.
    fn dim(&self) -> usize;

    /// Embed one text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, one vector per input.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Check a vector from the boundary: right dimension, every component finite.
pub fn validate(v: &[f32], dim: usize) -> Result<(), EmbeddingError> {
    if v.len() != dim {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dim,
            got: v.len(),
        });
    }
    match v.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(EmbeddingError::NonFinite { index }),
        None => Ok(()),
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Model-free embedder using signed feature hashing of word unigrams and bigrams.
///
/// Texts sharing vocabulary land close together, which is enough for
/// offline runs and tests. Output is L2-normalized; text without any word
/// characters embeds to the zero vector.
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn accumulate(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl Embed for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut v = vec![0.0f32; self.dim];
        for token in &tokens {
            self.accumulate(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        normalize(&mut v);
        Ok(v)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn hashing_embedding_is_unit_norm() {
        let e = HashingEmbedder::new(64);
        let v = e.embed("Privacy is a fundamental right").unwrap();
        assert_eq!(v.len(), 64);
        assert!((norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashing_embedding_is_deterministic() {
        let e = HashingEmbedder::default();
        let a = e.embed("internet shutdown in the state").unwrap();
        let b = e.embed("internet shutdown in the state").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_vocabulary_is_closer() {
        let e = HashingEmbedder::default();
        let shutdown = e.embed("internet shutdown during exams").unwrap();
        let suspension = e.embed("suspension of internet services, shutdown orders").unwrap();
        let tax = e.embed("income tax assessment of a partnership firm").unwrap();
        assert!(
            dot(&shutdown, &suspension) > dot(&shutdown, &tax),
            "shutdown texts should be closer than tax text"
        );
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert_eq!(e.embed(" ... ").unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn validate_rejects_bad_vectors() {
        assert!(validate(&[1.0, 0.0], 2).is_ok());
        assert!(matches!(
            validate(&[1.0], 2),
            Err(EmbeddingError::DimensionMismatch { expected: 2, got: 1 })
        ));
        assert!(matches!(
            validate(&[1.0, f32::NAN], 2),
            Err(EmbeddingError::NonFinite { index: 1 })
        ));
    }

    #[test]
    fn batch_matches_single() {
        let e = HashingEmbedder::new(32);
        let batch = e.embed_batch(&["a b", "c d"]).unwrap();
        assert_eq!(batch[0], e.embed("a b").unwrap());
        assert_eq!(batch[1], e.embed("c d").unwrap());
    }
}
