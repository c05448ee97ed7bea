//! EngramDB Memory Engine
//!
//! Maintains a long-lived, per-workspace semantic memory of an agent's
//! conversations: messages are buffered and segmented into episodes,
//! episodes yield categorized facts, facts are reconciled against what
//! is already stored, and search blends vector similarity with temporal
//! relevance.
//!
//! # Pipeline
//!
//! 1. The host hands messages to [`MemoryOrchestrator::collect_message`]
//! 2. A background pass segments the buffer ([`episode`])
//! 3. Each episode yields fact candidates ([`extractor`])
//! 4. Each candidate is resolved against stored facts ([`resolver`])
//! 5. Search re-ranks similarity hits by recency ([`scoring`])
//! 6. A sweeper retires expired debugging facts ([`retention`])

pub mod config;
pub mod context;
pub mod embeddings;
pub mod episode;
pub mod extractor;
pub mod fact;
pub mod hints;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod resolver;
pub mod retention;
pub mod scoring;

pub use config::MemoryConfig;
pub use context::ContextGenerator;
pub use embeddings::{
    create_provider, EmbeddingConfig, EmbeddingError, EmbeddingProvider, EmbeddingProviderType,
    MockEmbeddingProvider,
};
pub use episode::{ConversationEpisode, DetectorConfig, EpisodeDetector, EpisodeId};
pub use extractor::FactExtractor;
pub use fact::{
    CategorizedFactInput, ConversationFact, FactCategory, FactId, MemoryAction,
};
pub use hints::{HintProvider, NoHints, ProjectContext, StaticHints, WorkspaceHints};
pub use llm::{
    create_generator, GenerationOptions, LlmConfig, LlmError, LlmProviderType, MockTextGenerator,
    TextGenerator,
};
pub use message::{Message, MessageRole};
pub use orchestrator::{IngestReport, MemoryOrchestrator, MemoryState};
pub use resolver::{ConflictResolver, ResolverConfig};
pub use retention::{
    spawn_interval_sweep, RetentionPolicy, RetentionSweeper, SweepOutcome,
};
pub use scoring::{ScoredFact, TemporalScorer};
