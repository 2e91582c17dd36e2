use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bankrag_core::error::{Error, Result};
use bankrag_core::traits::EmbedProvider;
use bankrag_embed::{BertEmbedder, HashingEmbedder, TextEmbedder};
use tracing::info;

/// In-process embeddings; model inference runs on the blocking pool.
pub struct LocalEmbedProvider {
    inner: Arc<dyn TextEmbedder>,
    id: String,
}

impl LocalEmbedProvider {
    /// Deterministic hashing embedder of dimension `dim`.
    pub fn hashing(dim: usize) -> Self {
        Self { inner: Arc::new(HashingEmbedder::new(dim)), id: format!("local:hashing:d{dim}") }
    }

    /// Loads the BERT model under `model_dir`. A missing or unloadable model
    /// directory is a configuration error.
    pub async fn load(model_dir: &Path, max_tokens: usize) -> Result<Self> {
        let dir = model_dir.to_path_buf();
        let model = tokio::task::spawn_blocking(move || BertEmbedder::load(&dir, max_tokens))
            .await
            .map_err(|e| Error::config(format!("embedding model load task: {e}")))?
            .map_err(|e| Error::config(format!("local embedding model: {e:#}")))?;
        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let id = format!("local:{name}:d{}", model.dim());
        info!(embedder = %id, "local embedding provider ready");
        Ok(Self { inner: Arc::new(model), id })
    }
}

#[async_trait]
impl EmbedProvider for LocalEmbedProvider {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| Error::connection("local embedder returned no vector"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || inner.embed_batch(&texts))
            .await
            .map_err(|e| Error::connection(format!("local embedder task: {e}")))?
            .map_err(|e| Error::connection(format!("local embedder: {e:#}")))
    }
}
