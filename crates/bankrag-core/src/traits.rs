use async_trait::async_trait;

use crate::error::Result;

/// Maps text to fixed-length vectors.
///
/// `dim()` is known before the first call and every vector returned has
/// exactly that length. Implementations are shared behind `Arc` by the
/// provider registry.
#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable backend identity, persisted next to the index (e.g. `openai:text-embedding-3-small`).
    fn embedder_id(&self) -> &str;

    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds `texts` preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Produces an answer for a fully composed prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn generator_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
