//! Fact extraction
//!
//! Converts an episode (or a short recent window) into categorized fact
//! candidates. The primary path asks the text generator for strict JSON;
//! when the provider fails, a keyword heuristic over the transcript
//! produces a degraded-but-useful result instead of an error.

use crate::fact::{CategorizedFactInput, FactCategory};
use crate::hints::ProjectContext;
use crate::llm::{GenerationOptions, TextGenerator};
use crate::message::{Message, MessageRole};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Framework and database terms that indicate infrastructure facts
const INFRASTRUCTURE_KEYWORDS: &[&str] = &[
    "postgresql",
    "postgres",
    "mysql",
    "sqlite",
    "redis",
    "kafka",
    "docker",
    "kubernetes",
    "react",
    "django",
    "rails",
    "tokio",
    "axum",
    "graphql",
];

/// Auth-related terms that indicate architecture facts
const ARCHITECTURE_KEYWORDS: &[&str] = &[
    "authentication",
    "authorization",
    "oauth",
    "jwt",
    "session token",
    "login flow",
    "single sign-on",
];

/// Error and bug terms that indicate debugging facts
const DEBUGGING_KEYWORDS: &[&str] = &[
    "stack trace",
    "panic",
    "crash",
    "exception",
    "error",
    "bug",
    "regression",
];

/// Raw extraction response shape
#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    facts: Vec<RawFact>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(default)]
    content: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Extracts categorized fact candidates from conversation
#[derive(Clone)]
pub struct FactExtractor {
    generator: Arc<dyn TextGenerator>,
    max_transcript_chars: usize,
}

impl FactExtractor {
    /// Create an extractor over a text generator
    pub fn new(generator: Arc<dyn TextGenerator>, max_transcript_chars: usize) -> Self {
        Self {
            generator,
            max_transcript_chars,
        }
    }

    /// Extract facts, falling back to keyword heuristics on provider
    /// failure. Never errors; worst case returns an empty sequence.
    pub async fn extract(
        &self,
        messages: &[Message],
        project: Option<&ProjectContext>,
    ) -> Vec<CategorizedFactInput> {
        match self.try_extract(messages, project).await {
            Ok(facts) => facts,
            Err(reason) => {
                warn!("Fact extraction fell back to heuristics: {}", reason);
                self.heuristic_facts(messages)
            }
        }
    }

    /// Strict extraction through the provider only
    ///
    /// Returns an empty sequence (not an error) when the provider fails.
    pub async fn extract_with_provider(
        &self,
        messages: &[Message],
        project: Option<&ProjectContext>,
    ) -> Vec<CategorizedFactInput> {
        match self.try_extract(messages, project).await {
            Ok(facts) => facts,
            Err(reason) => {
                debug!("Strict extraction returned nothing: {}", reason);
                Vec::new()
            }
        }
    }

    async fn try_extract(
        &self,
        messages: &[Message],
        project: Option<&ProjectContext>,
    ) -> Result<Vec<CategorizedFactInput>, String> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(messages, project);
        let value = self
            .generator
            .generate_json(&prompt, &GenerationOptions::structured())
            .await
            .map_err(|e| e.to_string())?;

        let response: ExtractionResponse =
            serde_json::from_value(value).map_err(|e| format!("malformed response: {e}"))?;

        Ok(sanitize(response))
    }

    fn build_prompt(&self, messages: &[Message], project: Option<&ProjectContext>) -> String {
        let mut prompt = String::from(
            "Extract durable facts about this project from the conversation below. \
             Respond with a JSON object: {\"facts\": [{\"content\": string, \
             \"category\": \"infrastructure\"|\"architecture\"|\"debugging\"|\"pattern\", \
             \"confidence\": number}]}. Only include facts worth remembering across \
             sessions.\n\n",
        );

        if let Some(project) = project {
            prompt.push_str(&format!("Project: {}\n", project.name));
            if let Some(description) = &project.description {
                prompt.push_str(&format!("Description: {description}\n"));
            }
            if !project.languages.is_empty() {
                prompt.push_str(&format!("Stack: {}\n", project.languages.join(", ")));
            }
            prompt.push('\n');
        }

        prompt.push_str("Conversation:\n");
        prompt.push_str(&self.transcript(messages));
        prompt
    }

    /// Transcript truncated to the configured character limit
    fn transcript(&self, messages: &[Message]) -> String {
        let mut transcript = String::new();
        for message in messages {
            let role = match message.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            };
            let line = format!("{role}: {}\n", message.content);
            if transcript.len() + line.len() > self.max_transcript_chars {
                let remaining = self.max_transcript_chars.saturating_sub(transcript.len());
                transcript.extend(line.chars().take(remaining));
                break;
            }
            transcript.push_str(&line);
        }
        transcript
    }

    /// Keyword fallback over the lowercased transcript
    fn heuristic_facts(&self, messages: &[Message]) -> Vec<CategorizedFactInput> {
        let text = messages
            .iter()
            .map(|m| m.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let mut facts = Vec::new();

        for keyword in INFRASTRUCTURE_KEYWORDS {
            if text.contains(keyword) {
                facts.push(CategorizedFactInput {
                    content: format!("The project uses {keyword}"),
                    category: FactCategory::Infrastructure,
                    confidence: 0.6,
                });
            }
        }

        for keyword in ARCHITECTURE_KEYWORDS {
            if text.contains(keyword) {
                facts.push(CategorizedFactInput {
                    content: format!("The project's auth design involves {keyword}"),
                    category: FactCategory::Architecture,
                    confidence: 0.55,
                });
            }
        }

        for keyword in DEBUGGING_KEYWORDS {
            if text.contains(keyword) {
                facts.push(CategorizedFactInput {
                    content: format!("The conversation mentions a {keyword}"),
                    category: FactCategory::Debugging,
                    confidence: 0.5,
                });
            }
        }

        debug!("Heuristic extraction produced {} facts", facts.len());
        facts
    }
}

/// Trim, drop empties, clamp confidence, default unknown categories
fn sanitize(response: ExtractionResponse) -> Vec<CategorizedFactInput> {
    response
        .facts
        .into_iter()
        .filter_map(|raw| {
            let content = raw.content.trim().to_string();
            if content.is_empty() {
                return None;
            }

            let category = raw
                .category
                .as_deref()
                .and_then(FactCategory::parse)
                .unwrap_or(FactCategory::Pattern);

            let confidence = match raw.confidence {
                Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
                _ => DEFAULT_CONFIDENCE,
            };

            Some(CategorizedFactInput {
                content,
                category,
                confidence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmResult, MockTextGenerator};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn generate_json(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> LlmResult<Value> {
            Err(LlmError::Network("connection refused".to_string()))
        }
    }

    struct CannedGenerator(Value);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn generate_json(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> LlmResult<Value> {
            Ok(self.0.clone())
        }
    }

    fn messages() -> Vec<Message> {
        vec![
            Message::user("We moved the service to PostgreSQL last sprint"),
            Message::assistant("Noted, the connection pool is configured for Postgres."),
        ]
    }

    #[tokio::test]
    async fn test_primary_path_parses_facts() {
        let extractor = FactExtractor::new(Arc::new(MockTextGenerator::new()), 4000);
        let facts = extractor.extract(&messages(), None).await;

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].category, FactCategory::Infrastructure);
        assert!((facts[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sanitizer_rules() {
        let canned = CannedGenerator(json!({
            "facts": [
                { "content": "  padded  ", "category": "infrastructure", "confidence": 0.8 },
                { "content": "", "category": "debugging", "confidence": 0.9 },
                { "content": "over-confident", "category": "debugging", "confidence": 7.5 },
                { "content": "no confidence", "category": "architecture" },
                { "content": "weird category", "category": "astrology", "confidence": 0.4 },
            ]
        }));
        let extractor = FactExtractor::new(Arc::new(canned), 4000);
        let facts = extractor.extract(&messages(), None).await;

        assert_eq!(facts.len(), 4);
        assert_eq!(facts[0].content, "padded");
        assert_eq!(facts[1].confidence, 1.0);
        assert_eq!(facts[2].confidence, DEFAULT_CONFIDENCE);
        assert_eq!(facts[3].category, FactCategory::Pattern);
    }

    #[tokio::test]
    async fn test_fallback_never_throws() {
        let extractor = FactExtractor::new(Arc::new(FailingGenerator), 4000);
        let facts = extractor.extract(&messages(), None).await;

        // Heuristics find the database keywords
        assert!(facts
            .iter()
            .any(|f| f.category == FactCategory::Infrastructure));
        assert!(facts.iter().all(|f| f.confidence >= 0.5));
    }

    #[tokio::test]
    async fn test_fallback_on_malformed_response() {
        let extractor = FactExtractor::new(
            Arc::new(CannedGenerator(json!({ "facts": "not an array" }))),
            4000,
        );
        let facts = extractor.extract(&messages(), None).await;
        assert!(!facts.is_empty()); // heuristics kicked in
    }

    #[tokio::test]
    async fn test_strict_path_returns_empty_on_failure() {
        let extractor = FactExtractor::new(Arc::new(FailingGenerator), 4000);
        let facts = extractor.extract_with_provider(&messages(), None).await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_messages() {
        let extractor = FactExtractor::new(Arc::new(MockTextGenerator::new()), 4000);
        assert!(extractor.extract(&[], None).await.is_empty());
    }

    #[tokio::test]
    async fn test_heuristics_on_plain_chat_are_empty() {
        let extractor = FactExtractor::new(Arc::new(FailingGenerator), 4000);
        let facts = extractor
            .extract(&[Message::user("thanks, that looks great")], None)
            .await;
        assert!(facts.is_empty());
    }

    #[test]
    fn test_transcript_truncation() {
        let extractor = FactExtractor::new(Arc::new(MockTextGenerator::new()), 50);
        let long = vec![
            Message::user("a".repeat(40)),
            Message::user("b".repeat(40)),
        ];
        let transcript = extractor.transcript(&long);
        assert!(transcript.len() <= 50);
        assert!(transcript.contains('a'));
    }

    #[test]
    fn test_prompt_embeds_project_metadata() {
        let extractor = FactExtractor::new(Arc::new(MockTextGenerator::new()), 4000);
        let mut project = ProjectContext::new("billing-service");
        project.languages = vec!["rust".to_string()];

        let prompt = extractor.build_prompt(&messages(), Some(&project));
        assert!(prompt.contains("billing-service"));
        assert!(prompt.contains("rust"));
    }
}
