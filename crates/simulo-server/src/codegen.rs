//! Code generator backed by an OpenAI-compatible chat completion API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use simulo_core::{ChatMessage, CodeGenerator, Conversation, GenerationError};
use tracing::debug;

use crate::config::CodegenConfig;

const TEMPERATURE: f32 = 0.2;

pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(config: &CodegenConfig) -> Self {
        OpenAiGenerator {
            client: reqwest::Client::new(),
            endpoint: config.url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl CodeGenerator for OpenAiGenerator {
    async fn generate(&self, conversation: &Conversation) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::Transport("no API key configured".into()))?;

        let request = CompletionRequest {
            model: &self.model,
            messages: conversation.messages(),
            temperature: TEMPERATURE,
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        debug!(url = %url, turns = request.messages.len(), "requesting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("failed to parse response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}
