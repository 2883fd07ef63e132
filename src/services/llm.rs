//! LLM Service for natural-language recommendations
//!
//! Wraps a text-completion backend (Gemini REST or OpenAI chat completions)
//! behind credential and model rotation. The rotation position is an explicit
//! [`RotationCursor`] value owned by the caller.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::AgentError;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client as OpenAiClient,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Classified failure of a single completion attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

/// A text-in/text-out completion endpoint
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, CompletionError>;
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini `generateContent` over REST
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    max_tokens: u32,
}

impl GeminiBackend {
    pub fn new(timeout: Duration, max_tokens: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            client,
            base_url: GEMINI_BASE_URL.to_string(),
            max_tokens,
        })
    }

    fn classify_status(status: StatusCode, body: &str) -> CompletionError {
        let detail = format!("{}: {}", status, truncate(body, 300));
        match status {
            StatusCode::TOO_MANY_REQUESTS => CompletionError::QuotaExceeded(detail),
            StatusCode::NOT_FOUND => CompletionError::ModelNotFound(detail),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Unauthorized(detail),
            StatusCode::BAD_REQUEST if body.contains("API key not valid") || body.contains("API_KEY_INVALID") => {
                CompletionError::Unauthorized(detail)
            }
            _ if body.contains("RESOURCE_EXHAUSTED") => CompletionError::QuotaExceeded(detail),
            _ => CompletionError::Other(detail),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/{}:generateContent", self.base_url, urlencoding::encode(model));
        debug!("POST {}", url);

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": self.max_tokens,
            }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::Other(format!("Failed to parse Gemini response: {}", e)))?;

        let content = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(CompletionError::Other("No response content from Gemini".to_string()));
        }

        debug!("Completion response length: {} chars", content.len());
        Ok(content)
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI chat completions through async-openai
pub struct OpenAiBackend {
    timeout: Duration,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(timeout: Duration, max_tokens: u32) -> Self {
        Self { timeout, max_tokens }
    }

    fn classify(error: OpenAIError) -> CompletionError {
        if let OpenAIError::Reqwest(e) = &error {
            return CompletionError::Transport(e.to_string());
        }

        let message = error.to_string();
        let lower = message.to_lowercase();
        if lower.contains("insufficient_quota") || lower.contains("rate limit") || lower.contains("quota") {
            CompletionError::QuotaExceeded(message)
        } else if lower.contains("model_not_found") || lower.contains("does not exist") {
            CompletionError::ModelNotFound(message)
        } else if lower.contains("invalid_api_key") || lower.contains("incorrect api key") {
            CompletionError::Unauthorized(message)
        } else {
            CompletionError::Other(message)
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, CompletionError> {
        debug!("Chat completion request - model: {}", model);

        let client = OpenAiClient::with_config(OpenAIConfig::new().with_api_key(credential));

        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| CompletionError::Other(e.to_string()))?,
        )];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(temperature)
            .build()
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, client.chat().create(request))
            .await
            .map_err(|_| {
                CompletionError::Transport(format!("chat completion timed out after {:?}", self.timeout))
            })?
            .map_err(Self::classify)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                CompletionError::Other(format!(
                    "No response content from LLM. Choices count: {}",
                    response.choices.len()
                ))
            })?;

        debug!("Chat completion response length: {} chars", content.len());
        Ok(content)
    }
}

// ============================================================================
// Rotation
// ============================================================================

/// Index of the credential the next request starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor(pub usize);

/// Outcome of a rotated completion plus the cursor to use next time
#[derive(Debug)]
pub struct Completion {
    pub result: crate::error::Result<String>,
    pub cursor: RotationCursor,
}

/// LLM service rotating over credentials and models
pub struct LlmService {
    backend: Arc<dyn CompletionBackend>,
    credentials: Vec<String>,
    models: Vec<String>,
    temperature: f32,
}

impl LlmService {
    /// Create a new LLM service from configuration
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let backend: Arc<dyn CompletionBackend> = match config.provider {
            LlmProvider::Gemini => Arc::new(GeminiBackend::new(config.timeout(), config.max_tokens)?),
            LlmProvider::OpenAi => Arc::new(OpenAiBackend::new(config.timeout(), config.max_tokens)),
        };

        info!(
            "LLM service ready: {:?}, {} credential(s), models {:?}",
            config.provider,
            config.api_keys.len(),
            config.models
        );

        Ok(Self::new(backend, config.api_keys.clone(), config.models.clone(), config.temperature))
    }

    /// Create with an explicit backend
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        credentials: Vec<String>,
        models: Vec<String>,
        temperature: f32,
    ) -> Self {
        Self {
            backend,
            credentials,
            models,
            temperature,
        }
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Try every (credential, model) pair once, starting at the cursor's credential.
    pub async fn complete(&self, cursor: RotationCursor, prompt: &str) -> Completion {
        let n = self.credentials.len();
        let mut attempts = 0usize;
        let mut failures = Vec::new();

        for offset in 0..n {
            let index = (cursor.0 + offset) % n;
            let credential = &self.credentials[index];

            for model in &self.models {
                attempts += 1;
                match self.backend.complete(credential, model, prompt, self.temperature).await {
                    Ok(text) => {
                        if offset > 0 || attempts > 1 {
                            info!("Completion served by key #{} with {}", index + 1, model);
                        }
                        return Completion {
                            result: Ok(text),
                            cursor: RotationCursor(index),
                        };
                    }
                    Err(err) => {
                        failures.push(format!("key #{} / {}: {}", index + 1, model, err));
                        match err {
                            CompletionError::QuotaExceeded(_) | CompletionError::ModelNotFound(_) => {
                                debug!("Key #{} / {} unavailable: {}", index + 1, model, err);
                            }
                            CompletionError::Unauthorized(_) => {
                                warn!("Key #{} rejected, skipping its remaining models: {}", index + 1, err);
                                break;
                            }
                            CompletionError::Transport(_) | CompletionError::Other(_) => {
                                warn!("Key #{} / {} failed: {}", index + 1, model, err);
                            }
                        }
                    }
                }
            }
        }

        warn!("All {} completion attempts failed", attempts);
        Completion {
            result: Err(AgentError::ServiceExhausted { attempts, failures }),
            cursor,
        }
    }

    /// Like [`complete`](Self::complete), but degrades exhaustion to a readable placeholder
    pub async fn complete_or_placeholder(&self, cursor: RotationCursor, prompt: &str) -> (String, RotationCursor) {
        let completion = self.complete(cursor, prompt).await;
        match completion.result {
            Ok(text) => (text, completion.cursor),
            Err(_) => (self.placeholder(), completion.cursor),
        }
    }

    pub fn placeholder(&self) -> String {
        format!(
            "⚠️ All {} API keys at capacity. Please try again later.",
            self.credentials.len()
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
