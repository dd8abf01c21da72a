//! The external text generator, consumed as an opaque oracle.
//!
//! The controller never interprets generator output beyond extracting code
//! payloads from it; everything behind this trait is replaceable, including
//! with deterministic fakes in tests.

mod chat;

pub use chat::ChatCompletionsGenerator;

use async_trait::async_trait;

use crate::error::GeneratorError;

/// One-shot text generation: a prompt in, free-form text out.
///
/// Implementations must be safe to share across concurrent sessions.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Send a single prompt and return the raw completion text.
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}
