//! ============================================================================
//! Model Capabilities - Externally injected text generation and embedding
//! ============================================================================
//! The memory engine never talks to a model provider directly. Callers inject
//! these capabilities as trait objects; tests substitute deterministic stubs.
//! ============================================================================

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Text-generation capability: prompt in, completion out, fallible.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Text-embedding capability: text in, vector out, fallible.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Shared handle to a text generator
pub type SharedGenerator = Arc<dyn TextGenerator>;

/// Shared handle to a text embedder
pub type SharedEmbedder = Arc<dyn TextEmbedder>;

#[async_trait]
impl<F> TextGenerator for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}
