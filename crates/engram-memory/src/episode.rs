//! Episode detection
//!
//! Splits a message stream into topic/time-coherent episodes. Boundaries
//! are forced by long gaps between messages or by episode size; an
//! optional semantic mode tracks a running centroid of message
//! embeddings and flags outliers, optionally confirmed by the text
//! generator.

use crate::config::MemoryConfig;
use crate::context::ContextGenerator;
use crate::embeddings::EmbeddingProvider;
use crate::hints::ProjectContext;
use crate::llm::{GenerationOptions, TextGenerator};
use crate::message::Message;
use engram_core::{EventTime, Result};
use engram_vector::cosine_distance;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Episode identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId(Uuid);

impl EpisodeId {
    /// Create a new episode ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EpisodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous, topically coherent run of messages
///
/// Consumed once by fact extraction; not persisted itself.
#[derive(Debug, Clone)]
pub struct ConversationEpisode {
    pub id: EpisodeId,
    pub messages: Vec<Message>,
    pub reference_time: EventTime,
    pub workspace_id: String,
    pub context_description: String,
    pub start_time: EventTime,
    pub end_time: EventTime,
    pub message_count: usize,
}

/// Detector tunables, lifted from [`MemoryConfig`]
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub gap: Duration,
    pub max_messages: usize,
    pub semantic: bool,
    pub semantic_k: f64,
    pub semantic_min_window: usize,
    pub verify_boundaries: bool,
}

impl From<&MemoryConfig> for DetectorConfig {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            gap: config.episode_gap,
            max_messages: config.max_episode_messages,
            semantic: config.semantic_boundaries,
            semantic_k: config.semantic_k,
            semantic_min_window: config.semantic_min_window,
            verify_boundaries: config.verify_boundaries,
        }
    }
}

/// Running embedding centroid for the open episode
struct SemanticState {
    sum: Vec<f32>,
    count: usize,
    /// Distances of accepted messages from the centroid at accept time
    distances: Vec<f64>,
    /// Set when the embedding provider failed; semantic boundaries are
    /// disabled for the remainder of the pass
    degraded: bool,
}

impl SemanticState {
    fn new() -> Self {
        Self {
            sum: Vec::new(),
            count: 0,
            distances: Vec::new(),
            degraded: false,
        }
    }

    fn centroid(&self) -> Option<Vec<f32>> {
        if self.count == 0 {
            return None;
        }
        Some(
            self.sum
                .iter()
                .map(|component| component / self.count as f32)
                .collect(),
        )
    }

    fn accept(&mut self, embedding: &[f32], distance: Option<f64>) {
        if self.sum.is_empty() {
            self.sum = embedding.to_vec();
        } else {
            for (total, component) in self.sum.iter_mut().zip(embedding.iter()) {
                *total += component;
            }
        }
        self.count += 1;
        if let Some(distance) = distance {
            self.distances.push(distance);
        }
    }

    fn reset(&mut self) {
        self.sum.clear();
        self.count = 0;
        self.distances.clear();
    }
}

/// Splits message streams into episodes
#[derive(Clone)]
pub struct EpisodeDetector {
    config: DetectorConfig,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    context: ContextGenerator,
}

impl EpisodeDetector {
    /// Create a detector with time/count boundaries only
    pub fn new(config: DetectorConfig, context: ContextGenerator) -> Self {
        Self {
            config,
            embeddings: None,
            generator: None,
            context,
        }
    }

    /// Builder: enable semantic boundaries over an embedding provider
    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Builder: verify semantic boundaries with the text generator
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Segment a snapshot of the message buffer into episodes
    ///
    /// Fewer than two messages yield zero or one episodes; an empty
    /// stream yields an empty sequence.
    pub async fn detect(
        &self,
        messages: &[Message],
        workspace: &str,
        project: Option<&ProjectContext>,
    ) -> Result<Vec<ConversationEpisode>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut episodes = Vec::new();
        let mut open: Vec<Message> = Vec::new();
        let mut semantic = SemanticState::new();

        for message in messages {
            let mut boundary = false;

            if let (Some(last), Some(current)) = (
                open.last().and_then(|m| m.timestamp),
                message.timestamp,
            ) {
                let gap_millis = current.as_millis() - last.as_millis();
                if gap_millis > self.config.gap.as_millis() as i64 {
                    debug!("Episode boundary: {}s gap", gap_millis / 1000);
                    boundary = true;
                }
            }

            if !boundary && open.len() >= self.config.max_messages {
                debug!(
                    "Episode boundary: reached {} messages",
                    self.config.max_messages
                );
                boundary = true;
            }

            let embedding = self.embed_if_semantic(message, &mut semantic).await;

            if !boundary
                && !semantic.degraded
                && open.len() >= self.config.semantic_min_window
            {
                if let (Some(embedding), Some(centroid)) =
                    (embedding.as_deref(), semantic.centroid())
                {
                    let distance = cosine_distance(embedding, &centroid) as f64;
                    if self.is_semantic_outlier(distance, &semantic.distances) {
                        boundary = self.confirm_boundary(&open, message).await;
                    }
                }
            }

            if boundary && !open.is_empty() {
                episodes.push(self.close_episode(&open, workspace, project).await);
                open.clear();
                semantic.reset();
            }

            let distance = match (embedding.as_deref(), semantic.centroid()) {
                (Some(embedding), Some(centroid)) => {
                    Some(cosine_distance(embedding, &centroid) as f64)
                }
                _ => None,
            };
            if let Some(embedding) = embedding.as_deref() {
                semantic.accept(embedding, distance);
            }
            open.push(message.clone());
        }

        if !open.is_empty() {
            episodes.push(self.close_episode(&open, workspace, project).await);
        }

        Ok(episodes)
    }

    async fn embed_if_semantic(
        &self,
        message: &Message,
        semantic: &mut SemanticState,
    ) -> Option<Vec<f32>> {
        if !self.config.semantic || semantic.degraded || message.content.is_empty() {
            return None;
        }
        let provider = self.embeddings.as_ref()?;
        match provider.embed(&message.content).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(
                    "Embedding failed, disabling semantic boundaries for this pass: {}",
                    e
                );
                semantic.degraded = true;
                None
            }
        }
    }

    fn is_semantic_outlier(&self, distance: f64, history: &[f64]) -> bool {
        if history.is_empty() {
            return false;
        }
        let med = median(history);
        let deviations: Vec<f64> = history.iter().map(|d| (d - med).abs()).collect();
        let mad = median(&deviations);
        distance > med + self.config.semantic_k * mad
    }

    /// Ask the generator to confirm or veto a candidate boundary.
    /// Provider errors confirm: the distance evidence stands.
    async fn confirm_boundary(&self, open: &[Message], next: &Message) -> bool {
        if !self.config.verify_boundaries {
            return true;
        }
        let Some(generator) = &self.generator else {
            return true;
        };

        let recent: Vec<&str> = open
            .iter()
            .rev()
            .take(3)
            .map(|m| m.content.as_str())
            .collect();
        let prompt = format!(
            "Previous messages:\n{}\n\nNext message:\n{}\n\nDoes a topic boundary occur \
             before the next message? Respond as JSON: {{\"boundary\": true|false}}",
            recent.join("\n"),
            next.content
        );

        match generator
            .generate_json(&prompt, &GenerationOptions::structured())
            .await
        {
            Ok(value) => value
                .get("boundary")
                .and_then(|b| b.as_bool())
                .unwrap_or(true),
            Err(e) => {
                warn!("Boundary verification failed, keeping boundary: {}", e);
                true
            }
        }
    }

    async fn close_episode(
        &self,
        messages: &[Message],
        workspace: &str,
        project: Option<&ProjectContext>,
    ) -> ConversationEpisode {
        let end_time = messages
            .iter()
            .rev()
            .find_map(|m| m.timestamp)
            .unwrap_or_else(EventTime::now);
        let start_time = messages
            .iter()
            .find_map(|m| m.timestamp)
            .unwrap_or(end_time);

        let context_description = self.context.describe(messages, project).await;

        ConversationEpisode {
            id: EpisodeId::new(),
            messages: messages.to_vec(),
            reference_time: end_time,
            workspace_id: workspace.to_string(),
            context_description,
            start_time,
            end_time,
            message_count: messages.len(),
        }
    }
}

fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingResult;
    use crate::hints::NoHints;
    use crate::llm::LlmResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn detector(config: DetectorConfig) -> EpisodeDetector {
        EpisodeDetector::new(config, ContextGenerator::new(Arc::new(NoHints)))
    }

    fn base_config() -> DetectorConfig {
        DetectorConfig {
            gap: Duration::from_secs(30 * 60),
            max_messages: 25,
            semantic: false,
            semantic_k: 2.5,
            semantic_min_window: 5,
            verify_boundaries: false,
        }
    }

    fn timed(content: &str, millis: i64) -> Message {
        Message::user(content).at(EventTime::from_millis(millis))
    }

    /// Embeds messages along two fixed axes by first letter
    struct AxisEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbeddings {
        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis"
        }

        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if text.starts_with('z') {
                Ok(vec![0.0, 1.0])
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    struct VetoGenerator;

    #[async_trait]
    impl TextGenerator for VetoGenerator {
        fn model_name(&self) -> &str {
            "veto"
        }

        async fn generate_json(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> LlmResult<Value> {
            Ok(json!({ "boundary": false }))
        }
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let episodes = detector(base_config())
            .detect(&[], "w1", None)
            .await
            .unwrap();
        assert!(episodes.is_empty());
    }

    #[tokio::test]
    async fn test_single_message() {
        let episodes = detector(base_config())
            .detect(&[timed("hello", 0)], "w1", None)
            .await
            .unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].message_count, 1);
        assert_eq!(episodes[0].workspace_id, "w1");
        assert!(!episodes[0].context_description.is_empty());
    }

    #[tokio::test]
    async fn test_gap_boundary() {
        let minute = 60 * 1000i64;
        let messages = vec![
            timed("first", 0),
            timed("second", minute),
            timed("after a long break", 45 * minute),
        ];

        let episodes = detector(base_config())
            .detect(&messages, "w1", None)
            .await
            .unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].message_count, 2);
        assert_eq!(episodes[1].message_count, 1);
    }

    #[tokio::test]
    async fn test_exact_gap_is_not_a_boundary() {
        let messages = vec![
            timed("first", 0),
            timed("second", 30 * 60 * 1000), // exactly the gap
        ];

        let episodes = detector(base_config())
            .detect(&messages, "w1", None)
            .await
            .unwrap();
        assert_eq!(episodes.len(), 1);
    }

    #[tokio::test]
    async fn test_max_message_boundary() {
        let messages: Vec<Message> = (0..27)
            .map(|i| timed(&format!("message {i}"), i as i64 * 1000))
            .collect();

        let episodes = detector(base_config())
            .detect(&messages, "w1", None)
            .await
            .unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].message_count, 25);
        assert_eq!(episodes[1].message_count, 2);
    }

    #[tokio::test]
    async fn test_untimed_messages_form_one_episode() {
        let messages = vec![
            Message::user("a").untimed(),
            Message::user("b").untimed(),
            Message::user("c").untimed(),
        ];

        let episodes = detector(base_config())
            .detect(&messages, "w1", None)
            .await
            .unwrap();
        assert_eq!(episodes.len(), 1);
    }

    #[tokio::test]
    async fn test_episode_times() {
        let messages = vec![timed("start", 1000), timed("end", 5000)];
        let episodes = detector(base_config())
            .detect(&messages, "w1", None)
            .await
            .unwrap();

        assert_eq!(episodes[0].start_time.as_millis(), 1000);
        assert_eq!(episodes[0].end_time.as_millis(), 5000);
        assert_eq!(episodes[0].reference_time.as_millis(), 5000);
    }

    #[tokio::test]
    async fn test_semantic_boundary_on_topic_shift() {
        let config = DetectorConfig {
            semantic: true,
            ..base_config()
        };
        let detector = EpisodeDetector::new(config, ContextGenerator::new(Arc::new(NoHints)))
            .with_embeddings(Arc::new(AxisEmbeddings));

        let mut messages: Vec<Message> = (0..6)
            .map(|i| timed(&format!("api question {i}"), i as i64 * 1000))
            .collect();
        messages.push(timed("zebra migration plan", 7000));

        let episodes = detector.detect(&messages, "w1", None).await.unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].message_count, 6);
        assert_eq!(episodes[1].message_count, 1);
    }

    #[tokio::test]
    async fn test_semantic_boundary_needs_min_window() {
        let config = DetectorConfig {
            semantic: true,
            ..base_config()
        };
        let detector = EpisodeDetector::new(config, ContextGenerator::new(Arc::new(NoHints)))
            .with_embeddings(Arc::new(AxisEmbeddings));

        // Topic shift after only 3 messages, below the window: no boundary
        let messages = vec![
            timed("api question 0", 0),
            timed("api question 1", 1000),
            timed("api question 2", 2000),
            timed("zebra migration plan", 3000),
        ];

        let episodes = detector.detect(&messages, "w1", None).await.unwrap();
        assert_eq!(episodes.len(), 1);
    }

    #[tokio::test]
    async fn test_generator_can_veto_semantic_boundary() {
        let config = DetectorConfig {
            semantic: true,
            verify_boundaries: true,
            ..base_config()
        };
        let detector = EpisodeDetector::new(config, ContextGenerator::new(Arc::new(NoHints)))
            .with_embeddings(Arc::new(AxisEmbeddings))
            .with_generator(Arc::new(VetoGenerator));

        let mut messages: Vec<Message> = (0..6)
            .map(|i| timed(&format!("api question {i}"), i as i64 * 1000))
            .collect();
        messages.push(timed("zebra migration plan", 7000));

        let episodes = detector.detect(&messages, "w1", None).await.unwrap();
        assert_eq!(episodes.len(), 1);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0]), 3.0);
        assert_eq!(median(&[1.0, 3.0]), 2.0);
        assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
    }
}
