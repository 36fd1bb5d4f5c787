//! Deterministic feature-hashing embedding provider.
//!
//! Maps lower-cased word unigrams and adjacent-word bigrams into signed
//! buckets with FNV-1a, then L2-normalizes. Texts that share words land close
//! together under cosine distance. Needs no model files or network, which
//! makes it the provider of choice for offline use and tests.

use super::{l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const PROVIDER: &str = "hash";
const DEFAULT_MODEL: &str = "fnv1a-unigram-bigram";
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Bigrams count for less than unigrams.
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashEmbeddingProvider {
    model: String,
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let dimensions = config.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        Self::with_dimensions(dimensions).map(|mut p| {
            if let Some(model) = &config.model {
                p.model = model.clone();
            }
            p
        })
    }

    pub fn with_dimensions(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::config("hash embeddings need at least one dimension"));
        }
        Ok(Self {
            model: DEFAULT_MODEL.to_string(),
            dimensions,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut v = vec![0.0f32; self.dimensions];
        if words.is_empty() {
            // keep the vector non-zero so cosine distance stays defined
            self.accumulate(&mut v, "\u{0}empty", 1.0);
            return v;
        }

        for word in &words {
            self.accumulate(&mut v, word, 1.0);
        }
        for pair in words.windows(2) {
            self.accumulate(&mut v, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        // signed buckets can cancel out exactly; fall back to a fixed feature
        if v.iter().all(|x| *x == 0.0) {
            self.accumulate(&mut v, "\u{0}cancelled", 1.0);
        }
        l2_normalize(&v)
    }

    fn accumulate(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dimensions as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}
