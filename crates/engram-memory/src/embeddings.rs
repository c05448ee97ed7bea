//! Embedding provider abstraction
//!
//! The engine embeds fact content and search queries through this
//! contract. Providers expose their output dimension so collection
//! creation can validate against it.

use async_trait::async_trait;
use engram_vector::normalize_vector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
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

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Supported embedding provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderType {
    /// OpenAI embeddings API
    OpenAI,
    /// Deterministic provider for testing
    Mock,
}

/// Configuration for embedding providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type
    pub provider: EmbeddingProviderType,

    /// Model name (e.g., "text-embedding-3-small")
    pub model: String,

    /// Embedding dimensions
    pub dimensions: usize,

    /// API key (for cloud providers)
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base_url: Option<String>,

    /// Timeout in seconds for API requests
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::mock(384)
    }
}

impl EmbeddingConfig {
    /// Create config for OpenAI text-embedding-3-small
    pub fn openai_small(api_key: &str) -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key: Some(api_key.to_string()),
            api_base_url: Some("https://api.openai.com/v1".to_string()),
            timeout_secs: 30,
        }
    }

    /// Create config for mock embeddings (testing)
    pub fn mock(dimensions: usize) -> Self {
        Self {
            provider: EmbeddingProviderType::Mock,
            model: "mock-embedding".to_string(),
            dimensions,
            api_key: None,
            api_base_url: None,
            timeout_secs: 30,
        }
    }
}

/// Trait for embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the embedding dimension for this provider
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Mock embedding provider for testing
///
/// Generates deterministic, normalized embeddings seeded from an xxh3
/// hash of the text.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider
    pub fn new(dimensions: usize) -> Self {
        info!(
            "Created mock embedding provider with {} dimensions",
            dimensions
        );
        Self { dimensions }
    }

    fn hash_to_embedding(&self, text: &str) -> Vec<f32> {
        let mut current = xxhash_rust::xxh3::xxh3_64(text.as_bytes());

        let mut embedding = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            // LCG over the hash for reproducible pseudo-random values
            current = current
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let value = ((current as f64) / (u64::MAX as f64) * 2.0 - 1.0) as f32;
            embedding.push(value);
        }

        normalize_vector(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        debug!("Mock embedding for text of length {}", text.len());
        Ok(self.hash_to_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                if t.is_empty() {
                    Err(EmbeddingError::InvalidInput("Empty text".to_string()))
                } else {
                    Ok(self.hash_to_embedding(t))
                }
            })
            .collect()
    }
}

/// OpenAI embedding provider
#[cfg(feature = "openai")]
pub struct OpenAIEmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

#[cfg(feature = "openai")]
impl OpenAIEmbeddingProvider {
    /// Create a new OpenAI provider
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        if config.api_key.is_none() {
            return Err(EmbeddingError::NotConfigured(
                "OpenAI API key required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        info!(
            "Created OpenAI embedding provider with model {}",
            config.model
        );

        Ok(Self { config, client })
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ApiError("Empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| EmbeddingError::NotConfigured("API key missing".to_string()))?;

        let base_url = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");

        let url = format!("{}/embeddings", base_url);

        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
            index: usize,
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        if response.status() == 429 {
            return Err(EmbeddingError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::ApiError(error_text));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Serialization(e.to_string()))?;

        // Sort by index to ensure correct order
        let mut data = embedding_response.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Create an embedding provider from configuration
pub fn create_provider(config: EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderType::Mock => Ok(Arc::new(MockEmbeddingProvider::new(config.dimensions))),
        #[cfg(feature = "openai")]
        EmbeddingProviderType::OpenAI => Ok(Arc::new(OpenAIEmbeddingProvider::new(config)?)),
        #[cfg(not(feature = "openai"))]
        EmbeddingProviderType::OpenAI => Err(EmbeddingError::NotConfigured(
            "OpenAI feature not enabled. Compile with --features openai".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new(384);

        let embedding = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);

        let embedding2 = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding, embedding2);

        let embedding3 = provider.embed("Goodbye world").await.unwrap();
        assert_ne!(embedding, embedding3);
    }

    #[tokio::test]
    async fn test_mock_provider_normalizes() {
        let provider = MockEmbeddingProvider::new(64);
        let embedding = provider.embed("Hello world").await.unwrap();
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_mock_provider_rejects_empty_text() {
        let provider = MockEmbeddingProvider::new(64);
        assert!(provider.embed("").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_batch() {
        let provider = MockEmbeddingProvider::new(64);
        let texts = vec!["First".to_string(), "Second".to_string()];
        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0], provider.embed("First").await.unwrap());
    }

    #[test]
    fn test_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, EmbeddingProviderType::Mock);
        assert_eq!(config.dimensions, 384);
    }

    #[test]
    fn test_create_mock_provider() {
        let provider = create_provider(EmbeddingConfig::mock(128)).unwrap();
        assert_eq!(provider.dimensions(), 128);
    }
}
