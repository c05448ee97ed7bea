//! Vector store and connector contracts
//!
//! The engine talks to the backing vector database exclusively through
//! these traits. Production deployments wire in a client for a remote
//! service; tests and local runs use [`crate::memory::InMemoryVectorStore`].

use crate::record::{CollectionInfo, Filter, FilterPage, ScoredRecord, VectorRecord};
use async_trait::async_trait;
use engram_core::Result;
use std::sync::Arc;

/// Contract for a vector database backend
///
/// Read paths degrade: `search` returns an empty result on a dimension
/// mismatch or a backend query failure. Write paths propagate errors so
/// callers can surface them.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection with the given vector dimension
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Fetch collection metadata, or `None` if the collection does not exist
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Delete a collection and all its records
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Remove every record from a collection, keeping the collection itself
    async fn clear_collection(&self, name: &str) -> Result<usize>;

    /// Insert or replace a record
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()>;

    /// Insert a record; errors if the id already exists
    async fn insert(&self, collection: &str, record: VectorRecord) -> Result<()>;

    /// Replace an existing record; errors if the id is missing
    async fn update(&self, collection: &str, record: VectorRecord) -> Result<()>;

    /// Delete a record by id, returning whether it existed
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Get a record by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>>;

    /// Similarity search, best matches first
    ///
    /// Returns an empty result when the query vector's length does not
    /// match the collection dimension or when the backend query fails.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &Filter,
    ) -> Result<Vec<ScoredRecord>>;

    /// Cursor-paginated filtered scan
    async fn filter(
        &self,
        collection: &str,
        limit: usize,
        filter: &Filter,
        cursor: Option<&str>,
    ) -> Result<FilterPage>;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<()>;
}

/// Factory for establishing vector store connections
///
/// The [`crate::coordinator::CollectionCoordinator`] caches one
/// connection per `(endpoint, credential)` pair and rebuilds it through
/// this seam when parameters change.
#[async_trait]
pub trait VectorConnector: Send + Sync {
    /// Establish a connection to the backend at `endpoint`
    async fn connect(
        &self,
        endpoint: &str,
        credential: Option<&str>,
    ) -> Result<Arc<dyn VectorStore>>;
}
