//! EngramDB - Workspace-scoped semantic memory for conversational agents
//!
//! This is the main library crate that re-exports all EngramDB components.

pub use engram_core as core;
pub use engram_memory as memory;
pub use engram_vector as vector;

// Re-export commonly used types
pub use engram_core::{Error, EventTime, IngestTime, Result, TimeRange};

pub use engram_vector::{
    CircuitBreaker, CollectionCoordinator, CollectionState, CollectionStatus, CoordinatorConfig,
    Filter, InMemoryConnector, InMemoryVectorStore, ScoredRecord, VectorConnector, VectorRecord,
    VectorStore,
};

pub use engram_memory::{
    ConversationEpisode, ConversationFact, EmbeddingProvider, EpisodeDetector, FactCategory,
    FactExtractor, HintProvider, MemoryAction, MemoryConfig, MemoryOrchestrator, MemoryState,
    Message, MessageRole, ProjectContext, RetentionSweeper, ScoredFact, TemporalScorer,
    TextGenerator,
};
