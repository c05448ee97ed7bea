//! Conflict resolution
//!
//! Decides how each candidate fact interacts with what is already
//! stored: exact duplicates are ignored, newer architecture decisions
//! supersede older ones, debugging resolutions delete the bug records
//! they resolve, and everything else is additive.

use crate::config::MemoryConfig;
use crate::fact::{ConversationFact, FactCategory, FactId, MemoryAction};
use engram_core::Result;
use engram_vector::{Filter, ScoredRecord, VectorStore};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Content markers of a debugging resolution
const RESOLUTION_MARKERS: &[&str] = &["resolved", "fixed", "no longer", "solved", "closed"];

/// Resolution thresholds, lifted from [`MemoryConfig`]
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub neighbor_limit: usize,
    pub duplicate_threshold: f32,
    pub supersede_threshold: f32,
    pub resolution_threshold: f32,
}

impl From<&MemoryConfig> for ResolverConfig {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            neighbor_limit: config.neighbor_limit,
            duplicate_threshold: config.duplicate_threshold,
            supersede_threshold: config.supersede_threshold,
            resolution_threshold: config.resolution_threshold,
        }
    }
}

/// Resolves candidate facts against the stored neighborhood
pub struct ConflictResolver {
    store: Arc<dyn VectorStore>,
    collection: String,
    config: ResolverConfig,
}

impl ConflictResolver {
    /// Create a resolver over a collection
    pub fn new(store: Arc<dyn VectorStore>, collection: &str, config: ResolverConfig) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            config,
        }
    }

    /// Decide the storage actions for a candidate fact
    ///
    /// Deterministic for a fixed neighborhood. A fact without an
    /// embedding cannot be compared and defaults to `Add`.
    pub async fn resolve(&self, fact: &ConversationFact) -> Result<Vec<MemoryAction>> {
        let Some(embedding) = fact.embedding.as_deref() else {
            return Ok(vec![MemoryAction::Add {
                fact: fact.clone(),
                reasoning: "no embedding available, resolution requires similarity".to_string(),
            }]);
        };

        let filter = Filter::new()
            .must_eq("workspace", fact.workspace_id.as_str())
            .must_eq("category", fact.category.as_str());

        let neighbors = self
            .store
            .search(
                &self.collection,
                embedding,
                self.config.neighbor_limit,
                &filter,
            )
            .await?;

        Ok(self.decide(fact, &neighbors))
    }

    fn decide(&self, fact: &ConversationFact, neighbors: &[ScoredRecord]) -> Vec<MemoryAction> {
        let content_lower = fact.content.to_lowercase();

        // 1. Exact duplicate
        let duplicate = neighbors.iter().any(|n| {
            n.score > self.config.duplicate_threshold
                && n.record
                    .payload_str("content")
                    .is_some_and(|c| c.to_lowercase() == content_lower)
        });
        if duplicate {
            debug!("Fact is an exact duplicate, ignoring: {}", fact.content);
            return vec![MemoryAction::Ignore {
                reasoning: format!(
                    "duplicate of an existing fact above similarity {}",
                    self.config.duplicate_threshold
                ),
            }];
        }

        // 2. Architecture decisions track only the current statement
        if fact.category == FactCategory::Architecture {
            let targets = self.neighbor_ids(neighbors, |n| {
                n.score > self.config.supersede_threshold
                    && n.record
                        .payload_str("content")
                        .is_some_and(|c| c.to_lowercase() != content_lower)
            });
            if !targets.is_empty() {
                debug!(
                    "Architecture fact supersedes {} neighbors: {}",
                    targets.len(),
                    fact.content
                );
                return vec![MemoryAction::Supersede {
                    fact: fact.clone(),
                    target_ids: targets,
                    reasoning: format!(
                        "newer architecture statement above similarity {}",
                        self.config.supersede_threshold
                    ),
                }];
            }
        }

        // 3. Debugging resolutions delete the bug records they resolve
        if fact.category == FactCategory::Debugging && is_resolution(&content_lower) {
            let targets =
                self.neighbor_ids(neighbors, |n| n.score > self.config.resolution_threshold);
            if !targets.is_empty() {
                debug!(
                    "Debugging resolution deletes {} neighbors: {}",
                    targets.len(),
                    fact.content
                );
                return vec![MemoryAction::DeleteExisting {
                    fact: fact.clone(),
                    target_ids: targets,
                    reasoning: format!(
                        "resolution of a debugging fact above similarity {}",
                        self.config.resolution_threshold
                    ),
                }];
            }
        }

        // 4. No conflict
        vec![MemoryAction::Add {
            fact: fact.clone(),
            reasoning: "no conflicting neighbor found".to_string(),
        }]
    }

    fn neighbor_ids<F>(&self, neighbors: &[ScoredRecord], predicate: F) -> Vec<FactId>
    where
        F: Fn(&ScoredRecord) -> bool,
    {
        neighbors
            .iter()
            .filter(|n| predicate(n))
            .filter_map(|n| match Uuid::parse_str(&n.record.id) {
                Ok(uuid) => Some(FactId::from_uuid(uuid)),
                Err(_) => {
                    warn!("Skipping neighbor with malformed id {}", n.record.id);
                    None
                }
            })
            .collect()
    }
}

/// Whether content reads as the resolution of a problem
fn is_resolution(content_lower: &str) -> bool {
    RESOLUTION_MARKERS
        .iter()
        .any(|marker| content_lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_vector::{InMemoryVectorStore, VectorRecord};
    use serde_json::json;

    fn config() -> ResolverConfig {
        ResolverConfig {
            neighbor_limit: 8,
            duplicate_threshold: 0.95,
            supersede_threshold: 0.8,
            resolution_threshold: 0.85,
        }
    }

    fn fact(content: &str, category: FactCategory, embedding: Vec<f32>) -> ConversationFact {
        ConversationFact::new("w1", content, category, 0.8).with_embedding(embedding)
    }

    /// Store a neighbor with a chosen vector so similarity is controlled
    async fn seed(
        store: &InMemoryVectorStore,
        content: &str,
        category: FactCategory,
        vector: Vec<f32>,
    ) -> FactId {
        let id = FactId::new();
        store
            .upsert(
                "facts",
                VectorRecord::new(
                    id.to_string(),
                    vector,
                    json!({ "workspace": "w1", "category": category.as_str(), "content": content }),
                ),
            )
            .await
            .unwrap();
        id
    }

    async fn resolver_with_store() -> (ConflictResolver, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("facts", 2).await.unwrap();
        let resolver = ConflictResolver::new(store.clone(), "facts", config());
        (resolver, store)
    }

    #[tokio::test]
    async fn test_no_embedding_defaults_to_add() {
        let (resolver, _store) = resolver_with_store().await;
        let fact = ConversationFact::new("w1", "x", FactCategory::Pattern, 0.7);

        let actions = resolver.resolve(&fact).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), "add");
    }

    #[tokio::test]
    async fn test_empty_store_adds() {
        let (resolver, _store) = resolver_with_store().await;
        let fact = fact("Uses PostgreSQL", FactCategory::Infrastructure, vec![1.0, 0.0]);

        let actions = resolver.resolve(&fact).await.unwrap();
        assert_eq!(actions[0].kind(), "add");
    }

    #[tokio::test]
    async fn test_exact_duplicate_is_ignored() {
        let (resolver, store) = resolver_with_store().await;
        seed(
            &store,
            "Uses PostgreSQL",
            FactCategory::Infrastructure,
            vec![1.0, 0.0],
        )
        .await;

        // Same content, near-identical vector
        let candidate = fact(
            "uses postgresql",
            FactCategory::Infrastructure,
            vec![1.0, 0.0],
        );
        let actions = resolver.resolve(&candidate).await.unwrap();
        assert_eq!(actions[0].kind(), "ignore");
    }

    #[tokio::test]
    async fn test_architecture_supersedes_similar_different_content() {
        let (resolver, store) = resolver_with_store().await;
        let old = seed(
            &store,
            "Uses PostgreSQL for persistence",
            FactCategory::Architecture,
            vec![1.0, 0.0],
        )
        .await;

        // cos([0.85, 0.527], [1, 0]) = 0.85, above the supersede threshold
        let candidate = fact(
            "Switched to MySQL",
            FactCategory::Architecture,
            vec![0.85, 0.526_783],
        );
        let actions = resolver.resolve(&candidate).await.unwrap();

        match &actions[0] {
            MemoryAction::Supersede { target_ids, .. } => {
                assert_eq!(target_ids, &vec![old]);
            }
            other => panic!("expected supersede, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_infrastructure_does_not_supersede() {
        let (resolver, store) = resolver_with_store().await;
        seed(
            &store,
            "Uses PostgreSQL",
            FactCategory::Infrastructure,
            vec![1.0, 0.0],
        )
        .await;

        let candidate = fact(
            "Also uses Redis",
            FactCategory::Infrastructure,
            vec![0.85, 0.526_783],
        );
        let actions = resolver.resolve(&candidate).await.unwrap();
        assert_eq!(actions[0].kind(), "add");
    }

    #[tokio::test]
    async fn test_debugging_resolution_deletes_bug_record() {
        let (resolver, store) = resolver_with_store().await;
        let bug = seed(
            &store,
            "Login endpoint returns 500 under load",
            FactCategory::Debugging,
            vec![1.0, 0.0],
        )
        .await;

        // cos = 0.9, above the resolution threshold
        let candidate = fact(
            "Login endpoint 500s are fixed by the pool change",
            FactCategory::Debugging,
            vec![0.9, 0.435_89],
        );
        let actions = resolver.resolve(&candidate).await.unwrap();

        match &actions[0] {
            MemoryAction::DeleteExisting { target_ids, .. } => {
                assert_eq!(target_ids, &vec![bug]);
            }
            other => panic!("expected delete_existing, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_debugging_without_resolution_marker_adds() {
        let (resolver, store) = resolver_with_store().await;
        seed(
            &store,
            "Login endpoint returns 500 under load",
            FactCategory::Debugging,
            vec![1.0, 0.0],
        )
        .await;

        let candidate = fact(
            "Login endpoint also times out sometimes",
            FactCategory::Debugging,
            vec![0.9, 0.435_89],
        );
        let actions = resolver.resolve(&candidate).await.unwrap();
        assert_eq!(actions[0].kind(), "add");
    }

    #[tokio::test]
    async fn test_category_filter_excludes_other_categories() {
        let (resolver, store) = resolver_with_store().await;
        // An architecture record that would otherwise be superseded
        seed(
            &store,
            "Uses PostgreSQL",
            FactCategory::Infrastructure,
            vec![1.0, 0.0],
        )
        .await;

        let candidate = fact(
            "Switched to MySQL",
            FactCategory::Architecture,
            vec![1.0, 0.0],
        );
        let actions = resolver.resolve(&candidate).await.unwrap();
        // The only neighbor is infrastructure, filtered out
        assert_eq!(actions[0].kind(), "add");
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let (resolver, store) = resolver_with_store().await;
        seed(
            &store,
            "Old decision",
            FactCategory::Architecture,
            vec![1.0, 0.0],
        )
        .await;

        let candidate = fact(
            "New decision",
            FactCategory::Architecture,
            vec![0.9, 0.435_89],
        );
        let first = resolver.resolve(&candidate).await.unwrap();
        for _ in 0..5 {
            let again = resolver.resolve(&candidate).await.unwrap();
            assert_eq!(first[0].kind(), again[0].kind());
        }
    }

    #[test]
    fn test_resolution_markers() {
        assert!(is_resolution("the bug is fixed now"));
        assert!(is_resolution("no longer reproduces"));
        assert!(is_resolution("resolved by upgrading"));
        assert!(!is_resolution("still investigating the crash"));
    }
}
