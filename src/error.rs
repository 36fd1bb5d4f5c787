//! Error taxonomy shared by every component.
//!
//! Each variant maps to one failure class with its own propagation policy:
//! configuration errors are fatal at startup, embedding and store errors are
//! absorbed during retrieval but surfaced during remember, backend errors end
//! the session, and history errors are only ever logged.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or unknown configuration value. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding backend was unavailable or failed.
    #[error("embedding provider `{provider}` failed: {message}")]
    Embedding { provider: String, message: String },

    /// Similarity search could not run (missing collection, bad `k`, dimension mismatch).
    #[error("store query failed: {0}")]
    StoreQuery(String),

    /// Append could not be made durable (I/O, schema or dimension mismatch).
    #[error("store write failed: {0}")]
    StoreWrite(String),

    /// The generation backend is missing or failed.
    #[error("generation backend error: {0}")]
    Backend(String),

    /// The history log could not be opened or appended to.
    #[error("history log error: {0}")]
    History(String),
}

impl Error {
    pub fn embedding(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Embedding {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
