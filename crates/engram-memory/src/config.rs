//! Memory engine configuration

use engram_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one workspace's memory engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Workspace this engine serves
    pub workspace_id: String,

    /// Vector store endpoint
    pub endpoint: String,

    /// Vector store credential, if the backend requires one
    pub credential: Option<String>,

    /// Prefix for the workspace's collection name
    pub collection_prefix: String,

    // ========== Episode detection ==========
    /// Gap between messages that forces an episode boundary
    pub episode_gap: Duration,

    /// Maximum messages per episode
    pub max_episode_messages: usize,

    /// Enable centroid-distance boundary detection
    pub semantic_boundaries: bool,

    /// MAD multiplier for semantic boundaries
    pub semantic_k: f64,

    /// Messages an episode must accumulate before semantic boundaries arm
    pub semantic_min_window: usize,

    /// Ask the text generator to confirm or veto semantic boundaries
    pub verify_boundaries: bool,

    // ========== Message intake ==========
    /// Minimum buffered messages before a background pass runs
    pub min_batch_messages: usize,

    // ========== Fact extraction ==========
    /// Transcript truncation for extraction prompts
    pub max_transcript_chars: usize,

    // ========== Conflict resolution ==========
    /// Nearest neighbors considered during resolution
    pub neighbor_limit: usize,

    /// Similarity above which identical content is an exact duplicate
    pub duplicate_threshold: f32,

    /// Similarity above which an architecture fact supersedes a neighbor
    pub supersede_threshold: f32,

    /// Similarity above which a debugging resolution deletes a neighbor
    pub resolution_threshold: f32,

    // ========== Scoring ==========
    /// Weight of similarity in the blended search score (alpha)
    pub similarity_weight: f64,

    /// Half-life of the temporal score, in days
    pub half_life_days: f64,

    // ========== Retention ==========
    /// Interval between retention sweeps
    pub sweep_interval: Duration,

    /// Page size for retention scans
    pub sweep_page_size: usize,

    /// How long resolved debugging facts are kept
    pub resolved_retention: Duration,

    /// How long unresolved debugging facts are kept
    pub stale_retention: Duration,

    // ========== Initialization ==========
    /// Timeout for collection setup during startup
    pub init_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            workspace_id: String::new(),
            endpoint: String::new(),
            credential: None,
            collection_prefix: "engram_facts".to_string(),
            episode_gap: Duration::from_secs(30 * 60),
            max_episode_messages: 25,
            semantic_boundaries: false,
            semantic_k: 2.5,
            semantic_min_window: 5,
            verify_boundaries: false,
            min_batch_messages: 4,
            max_transcript_chars: 4000,
            neighbor_limit: 8,
            duplicate_threshold: 0.95,
            supersede_threshold: 0.8,
            resolution_threshold: 0.85,
            similarity_weight: 0.65,
            half_life_days: 30.0,
            sweep_interval: Duration::from_secs(60 * 60),
            sweep_page_size: 128,
            resolved_retention: Duration::from_secs(7 * 24 * 60 * 60),
            stale_retention: Duration::from_secs(30 * 24 * 60 * 60),
            init_timeout: Duration::from_secs(60),
        }
    }
}

impl MemoryConfig {
    /// Create a configuration for a workspace
    pub fn new(workspace_id: &str, endpoint: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    /// The collection name holding this workspace's facts
    pub fn collection_name(&self) -> String {
        format!("{}_{}", self.collection_prefix, self.workspace_id)
    }

    /// Builder: set the credential
    pub fn credential(mut self, credential: &str) -> Self {
        self.credential = Some(credential.to_string());
        self
    }

    /// Builder: set the episode gap
    pub fn episode_gap(mut self, gap: Duration) -> Self {
        self.episode_gap = gap;
        self
    }

    /// Builder: enable semantic boundary detection
    pub fn semantic_boundaries(mut self) -> Self {
        self.semantic_boundaries = true;
        self
    }

    /// Builder: set the minimum message batch
    pub fn min_batch_messages(mut self, min: usize) -> Self {
        self.min_batch_messages = min;
        self
    }

    /// Builder: set the blend weight
    pub fn similarity_weight(mut self, weight: f64) -> Self {
        self.similarity_weight = weight;
        self
    }

    /// Fail fast on configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workspace_id.is_empty() {
            return Err(Error::Configuration(
                "workspace_id is required; every fact is scoped to a workspace".to_string(),
            ));
        }
        if self.endpoint.is_empty() {
            return Err(Error::Configuration(
                "vector store endpoint is required; set MemoryConfig::endpoint".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_weight) {
            return Err(Error::Configuration(format!(
                "similarity_weight must be in [0, 1], got {}",
                self.similarity_weight
            )));
        }
        if self.half_life_days <= 0.0 {
            return Err(Error::Configuration(format!(
                "half_life_days must be positive, got {}",
                self.half_life_days
            )));
        }
        if self.sweep_page_size == 0 || self.neighbor_limit == 0 {
            return Err(Error::Configuration(
                "sweep_page_size and neighbor_limit must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.episode_gap, Duration::from_secs(1800));
        assert_eq!(config.max_episode_messages, 25);
        assert_eq!(config.min_batch_messages, 4);
        assert_eq!(config.neighbor_limit, 8);
        assert!((config.similarity_weight - 0.65).abs() < f64::EPSILON);
    }

    #[test]
    fn test_builder() {
        let config = MemoryConfig::new("w1", "http://localhost:6334")
            .credential("secret")
            .min_batch_messages(2)
            .semantic_boundaries();

        assert_eq!(config.workspace_id, "w1");
        assert_eq!(config.credential.as_deref(), Some("secret"));
        assert_eq!(config.min_batch_messages, 2);
        assert!(config.semantic_boundaries);
    }

    #[test]
    fn test_collection_name() {
        let config = MemoryConfig::new("w1", "http://localhost:6334");
        assert_eq!(config.collection_name(), "engram_facts_w1");
    }

    #[test]
    fn test_validate_requires_workspace_and_endpoint() {
        assert!(MemoryConfig::default().validate().is_err());
        assert!(MemoryConfig::new("w1", "").validate().is_err());
        assert!(MemoryConfig::new("", "http://x").validate().is_err());
        assert!(MemoryConfig::new("w1", "http://x").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_weight() {
        let config = MemoryConfig::new("w1", "http://x").similarity_weight(1.5);
        assert!(config.validate().is_err());
    }
}
