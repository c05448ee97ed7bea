//! EngramDB Vector Store Layer
//!
//! The memory engine talks to its backing vector database through the
//! contracts in this crate. Alongside the contracts live the pieces that
//! keep that access safe under concurrency and backend outages:
//!
//! - [`store`] - `VectorStore`/`VectorConnector` traits
//! - [`record`] - records, filters, search results
//! - [`memory`] - in-memory reference backend for tests and local runs
//! - [`similarity`] - cosine/dot-product vector math
//! - [`breaker`] - connection circuit breaker
//! - [`coordinator`] - shared connection + race-free collection creation

pub mod breaker;
pub mod coordinator;
pub mod memory;
pub mod record;
pub mod similarity;
pub mod store;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use coordinator::{
    CollectionCoordinator, CollectionState, CollectionStatus, CoordinatorConfig,
};
pub use memory::{InMemoryConnector, InMemoryVectorStore};
pub use record::{CollectionInfo, Filter, FilterPage, ScoredRecord, VectorRecord};
pub use similarity::{cosine_distance, cosine_similarity, dot_product, normalize_vector};
pub use store::{VectorConnector, VectorStore};
