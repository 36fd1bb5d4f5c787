//! Retrieval-augmented REPL memory for the Codex CLI.
//!
//! Every exchange typed into the REPL is embedded and appended to a vector
//! collection. Before each new instruction is sent to the generation backend,
//! the most similar past exchanges are retrieved and prepended as few-shot
//! context, so the assistant can reuse what worked before.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   `vec0` tables for exact KNN search, one row table plus one vector table
//!   per collection
//! - **Embeddings**: local ONNX Runtime (all-MiniLM-L6-v2, 384 dimensions), an
//!   OpenAI-compatible HTTP endpoint, or deterministic feature hashing
//! - **Generation**: `codex exec` run as a subprocess
//! - **History**: append-only audit table in a separate SQLite file
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`embedding`]: text-to-vector providers
//! - [`memory`]: entry types and the vector-backed memory store
//! - [`context`]: retrieve and remember on top of embedder + store
//! - [`prompt`]: few-shot prompt assembly
//! - [`backend`]: generation backends
//! - [`history`]: the turn audit log
//! - [`session`]: the interactive loop

pub mod backend;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod history;
pub mod memory;
pub mod prompt;
pub mod session;

pub use error::{Error, Result};
