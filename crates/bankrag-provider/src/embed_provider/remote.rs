use async_trait::async_trait;
use bankrag_core::config::CloudConfig;
use bankrag_core::error::{Error, Result};
use bankrag_core::traits::EmbedProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http;

/// OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
    dimensions_override: Option<usize>,
    id: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedProvider {
    pub fn new(cloud: &CloudConfig) -> Result<Self> {
        let api_key = http::require_key(cloud.api_key())?;
        let dim = cloud.embedding_dim();
        Ok(Self {
            client: http::client(cloud.timeout_secs)?,
            base_url: cloud.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cloud.embedding_model.clone(),
            dim,
            dimensions_override: cloud.embedding_dim,
            id: format!("openai:{}:d{dim}", cloud.embedding_model),
        })
    }

    /// Reachability and credential check against `/models`.
    pub async fn check(&self) -> Result<()> {
        http::check_openai(&self.client, &self.base_url, &self.api_key).await?;
        info!(embedder = %self.id, "cloud embedding provider validated");
        Ok(())
    }
}

#[async_trait]
impl EmbedProvider for OpenAiEmbedProvider {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| Error::connection("embeddings response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let what = "openai embeddings";
        let body = EmbedRequest { model: &self.model, input: texts, dimensions: self.dimensions_override };
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(what, e))?;
        let mut parsed: EmbedResponse = http::check_status(what, resp)
            .await?
            .json()
            .await
            .map_err(|e| http::send_error(what, e))?;
        if parsed.data.len() != texts.len() {
            return Err(Error::connection(format!(
                "{what}: asked for {} vectors, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        debug!(count = texts.len(), "cloud embeddings received");
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
