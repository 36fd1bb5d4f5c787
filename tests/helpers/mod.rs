#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use chrono::Utc;
use codex_memory::backend::{BackendOutput, GenerationBackend};
use codex_memory::config::RetrievalConfig;
use codex_memory::context::ContextManager;
use codex_memory::db;
use codex_memory::embedding::hash::HashEmbeddingProvider;
use codex_memory::embedding::EmbeddingProvider;
use codex_memory::memory::store::MemoryStore;
use codex_memory::memory::types::{DistanceMetric, MemoryEntry};
use codex_memory::{Error, Result};
use tokio::sync::Notify;

pub const DIM: usize = 8;
pub const HASH_DIM: usize = 128;

/// In-memory store with the collection already created.
pub fn test_store(dimension: usize) -> MemoryStore {
    let store = MemoryStore::open(db::IN_MEMORY, "interactions", dimension, DistanceMetric::Cosine)
        .unwrap();
    store.ensure_collection(Some("test")).unwrap();
    store
}

/// Unit vector along `axis`.
pub fn axis(axis: usize, dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dimension];
    v[axis % dimension] = 1.0;
    v
}

/// Entry with a caller-chosen embedding, for exercising the store directly.
pub fn entry(prompt: &str, response: &str, embedding: Vec<f32>) -> MemoryEntry {
    MemoryEntry {
        id: uuid::Uuid::now_v7().to_string(),
        timestamp: Utc::now(),
        prompt: prompt.to_string(),
        response: response.to_string(),
        tags: BTreeSet::new(),
        token_count: codex_memory::memory::types::token_count(prompt, response),
        embedding,
    }
}

/// Context manager over an in-memory store and the hash embedder.
pub fn hash_context(top_k: usize) -> ContextManager {
    let embedder = HashEmbeddingProvider::with_dimensions(HASH_DIM).unwrap();
    context_with(Arc::new(embedder), top_k)
}

pub fn context_with(embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> ContextManager {
    let store = MemoryStore::open(
        db::IN_MEMORY,
        "interactions",
        embedder.dimensions(),
        DistanceMetric::Cosine,
    )
    .unwrap();
    store.ensure_collection(Some(embedder.model())).unwrap();
    ContextManager::new(Arc::new(store), embedder, RetrievalConfig { top_k }).unwrap()
}

/// Embedder whose backend is always down.
pub struct FailingEmbedder {
    pub dimensions: usize,
}

impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(Error::embedding("failing", "backend unavailable"))
    }
}

/// Hash embedder that blocks from the `gate_from`-th call (0-based) on.
///
/// `entered` is notified when a call starts blocking; the call proceeds once
/// the sender returned by [`GatedEmbedder::new`] sends or is dropped.
pub struct GatedEmbedder {
    inner: HashEmbeddingProvider,
    calls: AtomicUsize,
    gate_from: usize,
    gate: Mutex<mpsc::Receiver<()>>,
    pub entered: Arc<Notify>,
}

impl GatedEmbedder {
    pub fn new(gate_from: usize) -> (Self, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel();
        let embedder = Self {
            inner: HashEmbeddingProvider::with_dimensions(HASH_DIM).unwrap(),
            calls: AtomicUsize::new(0),
            gate_from,
            gate: Mutex::new(gate),
            entered: Arc::new(Notify::new()),
        };
        (embedder, release)
    }
}

impl EmbeddingProvider for GatedEmbedder {
    fn name(&self) -> &str {
        "gated"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.gate_from {
            self.entered.notify_one();
            let _ = self.gate.lock().unwrap().recv();
        }
        self.inner.embed_batch(texts)
    }
}

/// Backend whose generation never finishes.
pub struct HangingBackend {
    pub prompts: Mutex<Vec<String>>,
    pub started: Arc<Notify>,
}

impl HangingBackend {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for HangingBackend {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, prompt: &str) -> Result<BackendOutput> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.started.notify_one();
        std::future::pending().await
    }
}

/// Backend that records every prompt and replays canned outputs.
///
/// Once the canned outputs run out it echoes a fixed reply.
pub struct MockBackend {
    pub prompts: Mutex<Vec<String>>,
    responses: Mutex<Vec<Result<BackendOutput>>>,
}

impl MockBackend {
    pub fn new(responses: Vec<Result<BackendOutput>>) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            responses: Mutex::new(responses),
        }
    }

    pub fn replying(stdout: &str) -> Self {
        Self::new(vec![Ok(BackendOutput::ok(stdout))])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<BackendOutput> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(BackendOutput::ok("ok"))
        } else {
            responses.remove(0)
        }
    }
}
