//! In-memory vector store
//!
//! Reference backend used by tests and local runs. Behaves like the
//! remote service contract: dimension-validated reads degrade to empty
//! results, writes propagate errors.

use crate::record::{CollectionInfo, Filter, FilterPage, ScoredRecord, VectorRecord};
use crate::similarity::cosine_similarity;
use crate::store::{VectorConnector, VectorStore};
use async_trait::async_trait;
use engram_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct Collection {
    dimension: usize,
    records: HashMap<String, VectorRecord>,
    /// Insertion order as (sequence, id) pairs. Sequence numbers are
    /// monotonic and survive deletions, so scan cursors stay valid when
    /// callers delete records between pages.
    order: Vec<(u64, String)>,
    next_seq: u64,
}

impl Collection {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: HashMap::new(),
            order: Vec::new(),
            next_seq: 1,
        }
    }

    fn put(&mut self, record: VectorRecord) {
        if !self.records.contains_key(&record.id) {
            self.order.push((self.next_seq, record.id.clone()));
            self.next_seq += 1;
        }
        self.records.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) -> bool {
        if self.records.remove(id).is_some() {
            self.order.retain(|(_, existing)| existing != id);
            true
        } else {
            false
        }
    }
}

/// In-memory implementation of [`VectorStore`]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn check_dimension(collection: &Collection, record: &VectorRecord) -> Result<()> {
        if record.vector.len() != collection.dimension {
            return Err(Error::DimensionMismatch {
                expected: collection.dimension,
                got: record.vector.len(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(Error::Configuration(
                "collection dimension must be non-zero".to_string(),
            ));
        }
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(Error::Storage(format!(
                "collection already exists: {name}"
            )));
        }
        collections.insert(name.to_string(), Collection::new(dimension));
        debug!("Created collection {} with dimension {}", name, dimension);
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            dimension: c.dimension,
            record_count: c.records.len(),
        }))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(name).is_some())
    }

    async fn clear_collection(&self, name: &str) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        let count = collection.records.len();
        collection.records.clear();
        collection.order.clear();
        Ok(count)
    }

    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Self::check_dimension(target, &record)?;
        target.put(record);
        Ok(())
    }

    async fn insert(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Self::check_dimension(target, &record)?;
        if target.records.contains_key(&record.id) {
            return Err(Error::Storage(format!(
                "record already exists: {}",
                record.id
            )));
        }
        target.put(record);
        Ok(())
    }

    async fn update(&self, collection: &str, record: VectorRecord) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Self::check_dimension(target, &record)?;
        if !target.records.contains_key(&record.id) {
            return Err(Error::RecordNotFound(record.id));
        }
        target.put(record);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Ok(target.remove(id))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.records.get(id))
            .cloned())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &Filter,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            warn!("Search against missing collection {}", collection);
            return Ok(Vec::new());
        };

        if vector.len() != target.dimension {
            warn!(
                "Search vector dimension {} does not match collection dimension {}",
                vector.len(),
                target.dimension
            );
            return Ok(Vec::new());
        }

        let mut results: Vec<ScoredRecord> = target
            .order
            .iter()
            .filter_map(|(_, id)| target.records.get(id))
            .filter(|record| filter.matches(&record.payload))
            .map(|record| ScoredRecord {
                record: record.clone(),
                score: cosine_similarity(vector, &record.vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn filter(
        &self,
        collection: &str,
        limit: usize,
        filter: &Filter,
        cursor: Option<&str>,
    ) -> Result<FilterPage> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        let after: u64 = match cursor {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Storage(format!("invalid cursor: {raw}")))?,
            None => 0,
        };

        let mut records = Vec::new();
        let mut last_seq = None;
        for (seq, id) in target.order.iter().filter(|(seq, _)| *seq > after) {
            last_seq = Some(*seq);
            let Some(record) = target.records.get(id) else {
                continue;
            };
            if filter.matches(&record.payload) {
                records.push(record.clone());
                if records.len() >= limit {
                    break;
                }
            }
        }

        let more_remain = match (last_seq, target.order.last()) {
            (Some(seq), Some((max_seq, _))) => *max_seq > seq,
            _ => false,
        };
        let next_cursor = more_remain.then(|| last_seq.unwrap_or(0).to_string());

        Ok(FilterPage {
            records,
            next_cursor,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Connector that hands out a shared [`InMemoryVectorStore`]
///
/// Every `(endpoint, credential)` pair connects to the same store, which
/// matches how tests expect reconnections to see existing data.
pub struct InMemoryConnector {
    store: Arc<InMemoryVectorStore>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryVectorStore::new()),
        }
    }

    /// The shared store behind this connector
    pub fn store(&self) -> Arc<InMemoryVectorStore> {
        Arc::clone(&self.store)
    }
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorConnector for InMemoryConnector {
    async fn connect(
        &self,
        endpoint: &str,
        _credential: Option<&str>,
    ) -> Result<Arc<dyn VectorStore>> {
        if endpoint.is_empty() {
            return Err(Error::Configuration(
                "vector store endpoint must not be empty".to_string(),
            ));
        }
        Ok(self.store.clone())
    }
}
