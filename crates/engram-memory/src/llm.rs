//! Text generation provider abstraction
//!
//! The engine consumes exactly one generation capability: a prompt in,
//! a parsed JSON object out. Fact extraction, boundary verification, and
//! episode descriptions all go through [`TextGenerator::generate_json`];
//! callers own their fallback behavior when the provider fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during generation
#[derive(Debug, Error)]
pub enum LlmError {
    /// API request failed
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider not configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Response was not the expected JSON
    #[error("Response parsing error: {0}")]
    ParseError(String),
}

/// Result type for generation operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Options for a single generation call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: Option<f32>,

    /// Maximum tokens in the response
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Low-temperature options for structured extraction
    pub fn structured() -> Self {
        Self {
            temperature: Some(0.2),
            max_tokens: Some(1024),
        }
    }
}

/// Supported generation provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProviderType {
    /// OpenAI Chat API
    OpenAI,
    /// Mock provider for testing
    Mock,
}

/// Configuration for generation providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProviderType,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// API key (for cloud providers)
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base_url: Option<String>,

    /// Timeout in seconds for API requests
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::mock()
    }
}

impl LlmConfig {
    /// Create config for OpenAI GPT-4o-mini
    pub fn openai_mini(api_key: &str) -> Self {
        Self {
            provider: LlmProviderType::OpenAI,
            model: "gpt-4o-mini".to_string(),
            api_key: Some(api_key.to_string()),
            api_base_url: Some("https://api.openai.com/v1".to_string()),
            timeout_secs: 60,
        }
    }

    /// Create config for the mock provider (testing)
    pub fn mock() -> Self {
        Self {
            provider: LlmProviderType::Mock,
            model: "mock-llm".to_string(),
            api_key: None,
            api_base_url: None,
            timeout_secs: 10,
        }
    }
}

/// Trait for text generation providers
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Get the model name
    fn model_name(&self) -> &str;

    /// Generate a JSON object from a prompt
    ///
    /// The returned value is already parsed; a response that is not
    /// valid JSON is a [`LlmError::ParseError`].
    async fn generate_json(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> LlmResult<Value>;
}

/// Mock generator for testing
///
/// Returns deterministic JSON keyed on what the prompt asks for.
pub struct MockTextGenerator {
    model: String,
}

impl MockTextGenerator {
    /// Create a new mock generator
    pub fn new() -> Self {
        info!("Created mock text generator");
        Self {
            model: "mock-llm".to_string(),
        }
    }
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_json(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> LlmResult<Value> {
        if prompt.is_empty() {
            return Err(LlmError::InvalidInput("Empty prompt".to_string()));
        }

        let lower = prompt.to_lowercase();
        let response = if lower.contains("extract") && lower.contains("fact") {
            json!({
                "facts": [
                    {
                        "content": "The project uses PostgreSQL as its primary database",
                        "category": "infrastructure",
                        "confidence": 0.9
                    },
                    {
                        "content": "Authentication is handled with JWT session tokens",
                        "category": "architecture",
                        "confidence": 0.8
                    }
                ]
            })
        } else if lower.contains("boundary") {
            json!({ "boundary": true })
        } else if lower.contains("describe") || lower.contains("description") {
            json!({ "description": "Discussion about project setup and tooling" })
        } else {
            json!({})
        };

        debug!("Mock generation produced {} response", self.model);
        Ok(response)
    }
}

/// OpenAI generation provider
#[cfg(feature = "openai")]
pub struct OpenAITextGenerator {
    config: LlmConfig,
    client: reqwest::Client,
}

#[cfg(feature = "openai")]
impl OpenAITextGenerator {
    /// Create a new OpenAI provider
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        if config.api_key.is_none() {
            return Err(LlmError::NotConfigured(
                "OpenAI API key required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        info!("Created OpenAI text generator with model {}", config.model);

        Ok(Self { config, client })
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl TextGenerator for OpenAITextGenerator {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate_json(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> LlmResult<Value> {
        if prompt.is_empty() {
            return Err(LlmError::InvalidInput("Empty prompt".to_string()));
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::NotConfigured("API key missing".to_string()))?;

        let base_url = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");

        let url = format!("{}/chat/completions", base_url);

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            response_format: Value,
            #[serde(skip_serializing_if = "Option::is_none")]
            max_tokens: Option<u32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            temperature: Option<f32>,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: json!({ "type": "json_object" }),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if response.status() == 429 {
            return Err(LlmError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError(error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| LlmError::ParseError("No choices in response".to_string()))?;

        serde_json::from_str(content).map_err(|e| LlmError::ParseError(e.to_string()))
    }
}

/// Create a generation provider from configuration
pub fn create_generator(config: LlmConfig) -> LlmResult<Arc<dyn TextGenerator>> {
    match config.provider {
        LlmProviderType::Mock => Ok(Arc::new(MockTextGenerator::new())),
        #[cfg(feature = "openai")]
        LlmProviderType::OpenAI => Ok(Arc::new(OpenAITextGenerator::new(config)?)),
        #[cfg(not(feature = "openai"))]
        LlmProviderType::OpenAI => Err(LlmError::NotConfigured(
            "OpenAI feature not enabled. Compile with --features openai".to_string(),
        )),
    }
}
