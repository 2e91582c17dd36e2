use async_trait::async_trait;
use bankrag_core::config::{CloudConfig, GenerationConfig};
use bankrag_core::error::{Error, Result};
use bankrag_core::traits::Generator;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::http;

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    id: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(cloud: &CloudConfig, generation: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(cloud.timeout_secs)?,
            base_url: cloud.base_url.trim_end_matches('/').to_string(),
            api_key: http::require_key(cloud.api_key())?,
            model: cloud.llm_model.clone(),
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            id: format!("openai:{}", cloud.llm_model),
        })
    }

    pub async fn check(&self) -> Result<()> {
        http::check_openai(&self.client, &self.base_url, &self.api_key).await?;
        info!(model = %self.model, "openai connection validated");
        Ok(())
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn generator_id(&self) -> &str { &self.id }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let what = "openai chat completion";
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::send_error(what, e))?;
        let parsed: ChatResponse = http::check_status(what, resp)
            .await?
            .json()
            .await
            .map_err(|e| http::send_error(what, e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| Error::connection(format!("{what}: response had no content")))
    }
}
