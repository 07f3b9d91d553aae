//! External text-generation collaborator.
//!
//! Invoked only on an explicit user trigger. Failures become chat-visible
//! system messages, never core faults.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("assistant unavailable: {0}")]
    Unavailable(String),

    #[error("generation failed: {0}")]
    Failed(String),
}

/// Request/response text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        media: Option<&[u8]>,
    ) -> Result<String, GenerationError>;
}
