use async_trait::async_trait;
use bankrag_core::config::{GenerationConfig, LocalConfig};
use bankrag_core::error::{Error, Result};
use bankrag_core::traits::Generator;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::http;

/// Local generation through an Ollama server.
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    options: OllamaOptions,
    id: String,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    top_k: u32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a OllamaOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaGenerator {
    pub fn new(local: &LocalConfig, generation: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(local.timeout_secs)?,
            base_url: local.ollama_url.trim_end_matches('/').to_string(),
            model: local.llm_model.clone(),
            options: OllamaOptions {
                temperature: generation.temperature,
                num_predict: generation.max_tokens,
                top_k: 40,
                top_p: 0.9,
                repeat_penalty: 1.1,
            },
            id: format!("ollama:{}", local.llm_model),
        })
    }

    /// The server must answer `/api/tags` and list the configured model.
    pub async fn check(&self) -> Result<()> {
        let what = "ollama tags";
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| Error::connection(format!("cannot reach ollama at {}: {e}", self.base_url)))?;
        let tags: TagsResponse = http::check_status(what, resp)
            .await?
            .json()
            .await
            .map_err(|e| http::send_error(what, e))?;
        if !tags.models.iter().any(|m| m.name == self.model) {
            let available: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
            error!(model = %self.model, ?available, "model not available in ollama");
            return Err(Error::connection(format!(
                "model '{}' not found in ollama; run: ollama pull {}",
                self.model, self.model
            )));
        }
        info!(model = %self.model, "ollama connection validated");
        Ok(())
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn generator_id(&self) -> &str { &self.id }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let what = "ollama generate";
        let body = GenerateRequest { model: &self.model, prompt, stream: false, options: &self.options };
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(what, e))?;
        let parsed: GenerateResponse = http::check_status(what, resp)
            .await?
            .json()
            .await
            .map_err(|e| http::send_error(what, e))?;
        Ok(parsed.response.trim().to_string())
    }
}
