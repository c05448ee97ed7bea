//! Episode context descriptions
//!
//! Every closed episode gets a one-line description used as retrieval
//! context for the facts derived from it. With a generator configured
//! the description is asked for directly; otherwise (or on provider
//! failure) it is assembled from the first user message plus any hint
//! vocabulary that actually occurs in the episode text.

use crate::hints::{HintProvider, ProjectContext};
use crate::llm::{GenerationOptions, TextGenerator};
use crate::message::{Message, MessageRole};
use std::sync::Arc;
use tracing::warn;

const SNIPPET_CHARS: usize = 80;

/// Generates `context_description` values for closed episodes
#[derive(Clone)]
pub struct ContextGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    hints: Arc<dyn HintProvider>,
}

impl ContextGenerator {
    /// Heuristic-only generator
    pub fn new(hints: Arc<dyn HintProvider>) -> Self {
        Self {
            generator: None,
            hints,
        }
    }

    /// Generator-backed, with heuristic fallback
    pub fn with_generator(
        generator: Arc<dyn TextGenerator>,
        hints: Arc<dyn HintProvider>,
    ) -> Self {
        Self {
            generator: Some(generator),
            hints,
        }
    }

    /// Describe an episode in one line
    pub async fn describe(
        &self,
        messages: &[Message],
        project: Option<&ProjectContext>,
    ) -> String {
        if messages.is_empty() {
            return "Empty conversation".to_string();
        }

        if let Some(generator) = &self.generator {
            let prompt = self.build_prompt(messages, project);
            match generator
                .generate_json(&prompt, &GenerationOptions::structured())
                .await
            {
                Ok(value) => {
                    if let Some(description) =
                        value.get("description").and_then(|d| d.as_str())
                    {
                        let trimmed = description.trim();
                        if !trimmed.is_empty() {
                            return trimmed.to_string();
                        }
                    }
                }
                Err(e) => {
                    warn!("Episode description generation failed, using heuristic: {}", e);
                }
            }
        }

        self.heuristic(messages, project).await
    }

    fn build_prompt(&self, messages: &[Message], project: Option<&ProjectContext>) -> String {
        let project_name = project.map(|p| p.name.as_str()).unwrap_or("a project");
        let mut prompt = format!(
            "Describe this conversation segment from {project_name} in one short line. \
             Respond as JSON: {{\"description\": \"...\"}}\n\n"
        );
        for message in messages.iter().take(10) {
            let role = match message.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            };
            prompt.push_str(&format!("{role}: {}\n", message.content));
        }
        prompt
    }

    async fn heuristic(
        &self,
        messages: &[Message],
        project: Option<&ProjectContext>,
    ) -> String {
        let snippet = messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .or_else(|| messages.first())
            .map(|m| truncate(&m.content, SNIPPET_CHARS))
            .unwrap_or_default();

        let hints = self.hints.hints(project).await;
        let text: String = messages
            .iter()
            .map(|m| m.content.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let mut matched: Vec<&str> = hints
            .vocabulary()
            .filter(|term| !term.is_empty() && text.contains(&term.to_lowercase()))
            .collect();
        matched.truncate(3);

        let mut description = format!("Discussion ({} messages): {snippet}", messages.len());
        if !matched.is_empty() {
            description.push_str(&format!(" [{}]", matched.join(", ")));
        }
        description
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
