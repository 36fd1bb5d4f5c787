//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and three implementations selected
//! once from configuration by [`create_provider`]:
//!
//! - [`local`]: ONNX Runtime + all-MiniLM-L6-v2 (384 dims, L2-normalized)
//! - [`openai`]: OpenAI-compatible `/embeddings` HTTP endpoint
//! - [`hash`]: deterministic feature hashing, no model files or network

pub mod hash;
pub mod local;
pub mod openai;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding text into vectors.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier, used in errors and logs.
    fn name(&self) -> &str;

    /// Model identifier recorded alongside the collection.
    fn model(&self) -> &str;

    /// Number of dimensions every vector has.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts. Output has the same length and order as the input.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        encode(self, &[text])?
            .pop()
            .ok_or_else(|| Error::embedding(self.name(), "provider returned no vector"))
    }
}

/// Encode `texts` with `provider`, checking the batch contract.
///
/// An empty input returns an empty output without calling the provider. A
/// provider that returns the wrong number of vectors, or vectors of the wrong
/// dimension, yields [`Error::Embedding`].
pub fn encode<P: EmbeddingProvider + ?Sized>(provider: &P, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(vec![]);
    }

    let vectors = provider.embed_batch(texts)?;
    if vectors.len() != texts.len() {
        return Err(Error::embedding(
            provider.name(),
            format!("returned {} vectors for {} inputs", vectors.len(), texts.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != provider.dimensions()) {
        return Err(Error::embedding(
            provider.name(),
            format!(
                "returned a {}-dim vector, expected {}",
                bad.len(),
                provider.dimensions()
            ),
        ));
    }
    Ok(vectors)
}

/// The fixed set of embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    OpenAi,
    Hash,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" | "fastembed" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "hash" => Ok(Self::Hash),
            other => Err(Error::config(format!(
                "unknown embedding provider: {other}. Supported: local, openai, hash"
            ))),
        }
    }
}

/// Create an embedding provider from config.
///
/// Unknown provider names fail here with [`Error::Configuration`], never at
/// first use. The `local` provider also fails here if its model files are
/// missing; run `codex-memory model download` first.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider.parse::<ProviderKind>()? {
        ProviderKind::Local => Box::new(local::LocalEmbeddingProvider::new(config)?),
        ProviderKind::OpenAi => Box::new(openai::OpenAiEmbeddingProvider::new(config)?),
        ProviderKind::Hash => Box::new(hash::HashEmbeddingProvider::new(config)?),
    };
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        dimensions = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(provider)
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub(crate) fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `[i, len]` for the i-th input and counts calls.
    struct CountingProvider {
        calls: AtomicUsize,
        short_by: usize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }
        fn model(&self) -> &str {
            "counting"
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .enumerate()
                .skip(self.short_by)
                .map(|(i, t)| vec![i as f32, t.len() as f32])
                .collect())
        }
    }

    fn counting(short_by: usize) -> CountingProvider {
        CountingProvider {
            calls: AtomicUsize::new(0),
            short_by,
        }
    }

    #[test]
    fn encode_empty_skips_provider() {
        let provider = counting(0);
        assert!(encode(&provider, &[]).unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn encode_preserves_order_and_length() {
        let provider = counting(0);
        let out = encode(&provider, &["a", "bbb", "cc"]).unwrap();
        assert_eq!(out, vec![vec![0.0, 1.0], vec![1.0, 3.0], vec![2.0, 2.0]]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn encode_rejects_short_batches() {
        let provider = counting(1);
        let err = encode(&provider, &["a", "b"]).unwrap_err();
        assert!(matches!(err, Error::Embedding { ref provider, .. } if provider == "counting"));
    }

    #[test]
    fn embed_uses_batch_path() {
        let provider = counting(0);
        assert_eq!(provider.embed("abcd").unwrap(), vec![0.0, 4.0]);
    }

    #[test]
    fn unknown_provider_fails_at_construction() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn fastembed_is_alias_for_local() {
        assert_eq!("fastembed".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert_eq!("hash".parse::<ProviderKind>().unwrap(), ProviderKind::Hash);
    }

    #[test]
    fn create_hash_provider() {
        let config = EmbeddingConfig {
            provider: "hash".into(),
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "hash");
        assert_eq!(provider.embed("hello").unwrap().len(), provider.dimensions());
    }

    #[test]
    fn test_l2_normalize() {
        let v = vec![3.0, 4.0];
        let normalized = l2_normalize(&v);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }
}
