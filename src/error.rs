//! Error types shared across the crate.
//!
//! Subsystems that classify external outcomes as data (the verifier adapter)
//! do not appear here; this module covers the calls that can genuinely fail.

use std::time::Duration;

/// Errors from the external text generator.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The provider rejected our credentials.
    #[error("generator auth failed for {provider}")]
    AuthFailed { provider: String },

    /// The provider asked us to back off.
    #[error("generator rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// Transport-level or HTTP-level failure.
    #[error("generator request to {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    /// The provider answered with something we could not decode.
    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    /// The provider was never given the configuration it needs.
    #[error("generator not configured: {reason}")]
    NotConfigured { reason: String },
}

/// Errors from the knowledge retrieval layer.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index search failed: {reason}")]
    Search { reason: String },

    #[error("corpus read failed: {0}")]
    CorpusRead(#[from] std::io::Error),

    #[error("corpus parse failed: {0}")]
    CorpusParse(#[from] serde_json::Error),
}
