use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use crate::config::ModelConfig;
use crate::types::{ChatMessage, GenerationParams, Role};

/// The generative model: complete a dialog into free text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        dialog: &[ChatMessage],
        params: &GenerationParams,
    ) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}

/// Pull complete `\n\n`-terminated SSE events out of `buffer`.
fn drain_events(buffer: &mut String) -> Vec<String> {
    let mut events = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        events.push(buffer[..pos].to_string());
        *buffer = buffer[pos + 2..].to_string();
    }
    events
}

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(
        &self,
        dialog: &[ChatMessage],
        params: &GenerationParams,
    ) -> anyhow::Result<String> {
        let system: Vec<&str> = dialog
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<serde_json::Value> = dialog
            .iter()
            .filter(|m| m.role != Role::System)
            .map(ChatMessage::as_provider_message)
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "messages": messages,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system.join("\n"));
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("anthropic returned {status}: {text}");
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut generated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for event_text in drain_events(&mut buffer) {
                let mut event_type = String::new();
                let mut data = String::new();
                for line in event_text.lines() {
                    if let Some(et) = line.strip_prefix("event: ") {
                        event_type = et.to_string();
                    } else if let Some(d) = line.strip_prefix("data: ") {
                        data = d.to_string();
                    }
                }

                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                let parsed: serde_json::Value = match serde_json::from_str(&data) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("skipping unparseable SSE data: {e}");
                        continue;
                    }
                };

                match event_type.as_str() {
                    "content_block_delta" => {
                        if let Some(text) = parsed
                            .get("delta")
                            .and_then(|d| d.get("text"))
                            .and_then(|t| t.as_str())
                        {
                            generated.push_str(text);
                        }
                    }
                    "message_stop" => return Ok(generated),
                    "error" => {
                        let message = parsed
                            .get("error")
                            .and_then(|e| e.get("message"))
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown stream error");
                        anyhow::bail!("anthropic stream error: {message}");
                    }
                    _ => {}
                }
            }
        }

        Ok(generated)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Any server speaking the OpenAI chat-completions protocol (OpenAI, vLLM, ...).
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(
        &self,
        dialog: &[ChatMessage],
        params: &GenerationParams,
    ) -> anyhow::Result<String> {
        let messages: Vec<serde_json::Value> =
            dialog.iter().map(ChatMessage::as_provider_message).collect();

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "stream": true,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {status}: {text}", self.base_url);
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut generated = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for event in drain_events(&mut buffer) {
                let Some(data) = event.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(generated);
                }

                let parsed: serde_json::Value = match serde_json::from_str(data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };

                if let Some(text) = parsed
                    .get("choices")
                    .and_then(|c| c.as_array())
                    .and_then(|choices| choices.first())
                    .and_then(|choice| choice.get("delta"))
                    .and_then(|delta| delta.get("content"))
                    .and_then(|content| content.as_str())
                {
                    generated.push_str(text);
                }
            }
        }

        Ok(generated)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Replays scripted responses in order, recording every dialog it receives.
/// Falls back to a fixed reply once the script runs out.
pub struct MockProvider {
    script: Mutex<VecDeque<String>>,
    fallback: String,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::scripted(Vec::<String>::new())
    }

    pub fn scripted<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: "Inner speech: mock reasoning\nOutput: mock response".to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Dialogs received so far, oldest first.
    pub fn dialogs(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(
        &self,
        dialog: &[ChatMessage],
        _params: &GenerationParams,
    ) -> anyhow::Result<String> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(dialog.to_vec());
        }
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow::anyhow!("mock script lock poisoned"))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a provider from config.
pub fn from_config(config: &ModelConfig) -> anyhow::Result<Box<dyn LlmProvider>> {
    match config.provider.as_str() {
        "anthropic" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                anyhow::anyhow!("no API key for provider 'anthropic'. Set ANTHROPIC_API_KEY env var.")
            })?;
            Ok(Box::new(AnthropicProvider::new(api_key, config.model.clone())))
        }
        "openai" => Ok(Box::new(OpenAiProvider::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.model.clone(),
        ))),
        "mock" => Ok(Box::new(MockProvider::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}
