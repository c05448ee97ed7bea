//! Collection lifecycle coordination
//!
//! Owns the single shared connection to the vector store and guarantees
//! race-free, dimension-validated collection creation. A registry tracks
//! every `(collection, workspace)` pair with a status that a background
//! health monitor keeps current; a circuit breaker gates connection
//! attempts while the backend is unreachable.

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::store::{VectorConnector, VectorStore};
use engram_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Circuit breaker settings for connection attempts
    pub breaker: BreakerConfig,

    /// How often the health monitor re-checks ready collections
    pub health_check_interval: Duration,

    /// Collections younger than this are not health-checked yet
    pub settle_window: Duration,

    /// Registry entries untouched for this long are evicted
    pub idle_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            health_check_interval: Duration::from_secs(30),
            settle_window: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Lifecycle status of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Creation/validation in progress
    Creating,
    /// Confirmed to exist with the expected dimension
    Ready,
    /// Creation failed or the collection became inaccessible
    Error,
}

/// Registry entry for one `(collection, workspace)` pair
#[derive(Debug, Clone)]
pub struct CollectionState {
    pub name: String,
    pub workspace: String,
    pub dimension: usize,
    pub status: CollectionStatus,
    pub created_at: Instant,
    pub last_accessed: Instant,
}

struct ActiveConnection {
    endpoint: String,
    credential: Option<String>,
    store: Arc<dyn VectorStore>,
}

type RegistryKey = (String, String);

/// Coordinates connection reuse and collection creation
///
/// Constructed once at the composition root and shared via `Arc`; every
/// piece of state it guards is internal, so dropping the coordinator
/// resets it.
pub struct CollectionCoordinator {
    connector: Arc<dyn VectorConnector>,
    config: CoordinatorConfig,
    breaker: Arc<CircuitBreaker>,
    connection: RwLock<Option<ActiveConnection>>,
    registry: Mutex<HashMap<RegistryKey, CollectionState>>,
    creation_locks: AsyncMutex<HashMap<RegistryKey, Arc<AsyncMutex<()>>>>,
}

impl CollectionCoordinator {
    /// Create a new coordinator over a connector
    pub fn new(connector: Arc<dyn VectorConnector>, config: CoordinatorConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        Self {
            connector,
            config,
            breaker,
            connection: RwLock::new(None),
            registry: Mutex::new(HashMap::new()),
            creation_locks: AsyncMutex::new(HashMap::new()),
        }
    }

    /// The circuit breaker gating connection attempts
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Get a connection for the given parameters
    ///
    /// Returns the existing connection when the parameters match,
    /// kicking off a non-blocking liveness probe. Otherwise establishes
    /// a fresh connection (discarding the old one), subject to the
    /// circuit breaker.
    pub async fn get_connection(
        &self,
        endpoint: &str,
        credential: Option<&str>,
    ) -> Result<Arc<dyn VectorStore>> {
        {
            let connection = self.connection.read().await;
            if let Some(active) = connection.as_ref() {
                if active.endpoint == endpoint && active.credential.as_deref() == credential {
                    let store = Arc::clone(&active.store);
                    let probe = Arc::clone(&active.store);
                    let breaker = Arc::clone(&self.breaker);
                    tokio::spawn(async move {
                        match probe.health_check().await {
                            Ok(()) => breaker.record_success(),
                            Err(e) => {
                                warn!("Vector store liveness probe failed: {}", e);
                                breaker.record_failure();
                            }
                        }
                    });
                    return Ok(store);
                }
            }
        }

        let mut connection = self.connection.write().await;
        // Another task may have connected while we waited for the lock
        if let Some(active) = connection.as_ref() {
            if active.endpoint == endpoint && active.credential.as_deref() == credential {
                return Ok(Arc::clone(&active.store));
            }
        }

        if !self.breaker.is_available() {
            return Err(Error::CircuitOpen(format!(
                "vector store at {endpoint} is unavailable"
            )));
        }

        match self.connector.connect(endpoint, credential).await {
            Ok(store) => {
                self.breaker.record_success();
                info!("Connected to vector store at {}", endpoint);
                *connection = Some(ActiveConnection {
                    endpoint: endpoint.to_string(),
                    credential: credential.map(str::to_string),
                    store: Arc::clone(&store),
                });
                Ok(store)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(Error::Connection(format!(
                    "failed to connect to vector store at {endpoint}: {e}"
                )))
            }
        }
    }

    /// The currently active connection, if any
    pub async fn store(&self) -> Option<Arc<dyn VectorStore>> {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.store))
    }

    /// Ensure a collection exists with the requested dimension
    ///
    /// Concurrent callers for the same `(name, workspace)` pair are
    /// serialized on a per-key mutex, so exactly one creation call
    /// reaches the backend. A registry entry already `Ready` with a
    /// matching dimension short-circuits without any network call.
    ///
    /// If the collection exists with a different dimension it is deleted
    /// and recreated; callers must expect data loss on embedding-model
    /// changes.
    pub async fn ensure_collection(
        &self,
        name: &str,
        workspace: &str,
        dimension: usize,
    ) -> Result<CollectionState> {
        let key = (name.to_string(), workspace.to_string());

        if let Some(state) = self.ready_state(&key, dimension) {
            return Ok(state);
        }

        let key_lock = {
            let mut locks = self.creation_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let _guard = key_lock.lock().await;

        // A concurrent caller may have finished creation while we waited
        if let Some(state) = self.ready_state(&key, dimension) {
            return Ok(state);
        }

        let store = self.store().await.ok_or_else(|| {
            Error::Connection("no active vector store connection".to_string())
        })?;

        self.set_status(&key, dimension, CollectionStatus::Creating);

        match self.create_or_validate(&store, name, dimension).await {
            Ok(()) => {
                let state = self.set_status(&key, dimension, CollectionStatus::Ready);
                debug!(
                    "Collection {} ready for workspace {} (dimension {})",
                    name, workspace, dimension
                );
                Ok(state)
            }
            Err(e) => {
                self.set_status(&key, dimension, CollectionStatus::Error);
                Err(e)
            }
        }
    }

    async fn create_or_validate(
        &self,
        store: &Arc<dyn VectorStore>,
        name: &str,
        dimension: usize,
    ) -> Result<()> {
        match store.collection_info(name).await? {
            None => {
                store.create_collection(name, dimension).await?;
            }
            Some(info) if info.dimension != dimension => {
                warn!(
                    "Collection {} has dimension {} but {} was requested: deleting and \
                     recreating, existing vectors are lost",
                    name, info.dimension, dimension
                );
                store.delete_collection(name).await?;
                store.create_collection(name, dimension).await?;
            }
            Some(_) => {}
        }

        // Confirm the backend agrees on the dimension before reporting ready
        let info = store
            .collection_info(name)
            .await?
            .ok_or_else(|| Error::Storage(format!("collection {name} missing after creation")))?;
        if info.dimension != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                got: info.dimension,
            });
        }
        Ok(())
    }

    fn ready_state(&self, key: &RegistryKey, dimension: usize) -> Option<CollectionState> {
        let mut registry = self.registry.lock().ok()?;
        let entry = registry.get_mut(key)?;
        if entry.status == CollectionStatus::Ready && entry.dimension == dimension {
            entry.last_accessed = Instant::now();
            Some(entry.clone())
        } else {
            None
        }
    }

    fn set_status(
        &self,
        key: &RegistryKey,
        dimension: usize,
        status: CollectionStatus,
    ) -> CollectionState {
        let now = Instant::now();
        let fresh = CollectionState {
            name: key.0.clone(),
            workspace: key.1.clone(),
            dimension,
            status,
            created_at: now,
            last_accessed: now,
        };
        let Ok(mut registry) = self.registry.lock() else {
            return fresh;
        };
        let entry = registry.entry(key.clone()).or_insert(fresh);
        entry.dimension = dimension;
        entry.status = status;
        entry.last_accessed = now;
        if status == CollectionStatus::Ready {
            entry.created_at = now;
        }
        entry.clone()
    }

    /// Current registry entry for a collection
    pub fn collection_status(&self, name: &str, workspace: &str) -> Option<CollectionState> {
        let registry = self.registry.lock().ok()?;
        registry
            .get(&(name.to_string(), workspace.to_string()))
            .cloned()
    }

    /// One health-monitor pass: re-check settled ready collections and
    /// evict idle registry entries
    pub async fn run_health_checks(&self) {
        let Some(store) = self.store().await else {
            return;
        };

        let to_check: Vec<RegistryKey> = {
            let registry = match self.registry.lock() {
                Ok(r) => r,
                Err(_) => return,
            };
            registry
                .iter()
                .filter(|(_, state)| {
                    state.status == CollectionStatus::Ready
                        && state.created_at.elapsed() >= self.config.settle_window
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        for key in to_check {
            let healthy = matches!(store.collection_info(&key.0).await, Ok(Some(_)));
            if !healthy {
                warn!(
                    "Collection {} (workspace {}) became inaccessible",
                    key.0, key.1
                );
                if let Ok(mut registry) = self.registry.lock() {
                    if let Some(entry) = registry.get_mut(&key) {
                        entry.status = CollectionStatus::Error;
                    }
                }
            }
        }

        if let Ok(mut registry) = self.registry.lock() {
            let idle = self.config.idle_timeout;
            registry.retain(|key, state| {
                let keep = state.last_accessed.elapsed() <= idle;
                if !keep {
                    debug!("Evicting idle registry entry {}/{}", key.0, key.1);
                }
                keep
            });
        }
    }

    /// Spawn the periodic health monitor task
    pub fn spawn_health_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.config.health_check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                coordinator.run_health_checks().await;
            }
        })
    }

    #[cfg(test)]
    fn backdate(&self, name: &str, workspace: &str, by: Duration) {
        let mut registry = self.registry.lock().unwrap();
        if let Some(entry) = registry.get_mut(&(name.to_string(), workspace.to_string())) {
            entry.created_at = Instant::now() - by;
            entry.last_accessed = Instant::now() - by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryConnector, InMemoryVectorStore};
    use crate::record::{CollectionInfo, Filter, FilterPage, ScoredRecord, VectorRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the in-memory store and counts creation calls
    struct CountingStore {
        inner: InMemoryVectorStore,
        create_calls: AtomicUsize,
        fail_info: std::sync::atomic::AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryVectorStore::new(),
                create_calls: AtomicUsize::new(0),
                fail_info: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl VectorStore for CountingStore {
        async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.create_collection(name, dimension).await
        }

        async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
            if self.fail_info.load(Ordering::SeqCst) {
                return Err(Error::Connection("backend unreachable".to_string()));
            }
            self.inner.collection_info(name).await
        }

        async fn delete_collection(&self, name: &str) -> Result<bool> {
            self.inner.delete_collection(name).await
        }

        async fn clear_collection(&self, name: &str) -> Result<usize> {
            self.inner.clear_collection(name).await
        }

        async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<()> {
            self.inner.upsert(collection, record).await
        }

        async fn insert(&self, collection: &str, record: VectorRecord) -> Result<()> {
            self.inner.insert(collection, record).await
        }

        async fn update(&self, collection: &str, record: VectorRecord) -> Result<()> {
            self.inner.update(collection, record).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
            self.inner.delete(collection, id).await
        }

        async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>> {
            self.inner.get(collection, id).await
        }

        async fn search(
            &self,
            collection: &str,
            vector: &[f32],
            limit: usize,
            filter: &Filter,
        ) -> Result<Vec<ScoredRecord>> {
            self.inner.search(collection, vector, limit, filter).await
        }

        async fn filter(
            &self,
            collection: &str,
            limit: usize,
            filter: &Filter,
            cursor: Option<&str>,
        ) -> Result<FilterPage> {
            self.inner.filter(collection, limit, filter, cursor).await
        }

        async fn health_check(&self) -> Result<()> {
            self.inner.health_check().await
        }
    }

    struct CountingConnector {
        store: Arc<CountingStore>,
        connect_failures: AtomicUsize,
    }

    impl CountingConnector {
        fn new() -> Self {
            Self {
                store: Arc::new(CountingStore::new()),
                connect_failures: AtomicUsize::new(0),
            }
        }

        fn failing(times: usize) -> Self {
            Self {
                store: Arc::new(CountingStore::new()),
                connect_failures: AtomicUsize::new(times),
            }
        }
    }

    #[async_trait]
    impl VectorConnector for CountingConnector {
        async fn connect(
            &self,
            _endpoint: &str,
            _credential: Option<&str>,
        ) -> Result<Arc<dyn VectorStore>> {
            let remaining = self.connect_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.connect_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Connection("refused".to_string()));
            }
            Ok(Arc::clone(&self.store) as Arc<dyn VectorStore>)
        }
    }

    fn coordinator_with(connector: CountingConnector) -> (Arc<CollectionCoordinator>, Arc<CountingStore>) {
        let store = Arc::clone(&connector.store);
        let coordinator = Arc::new(CollectionCoordinator::new(
            Arc::new(connector),
            CoordinatorConfig::default(),
        ));
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_connection_reuse() {
        let (coordinator, _store) = coordinator_with(CountingConnector::new());

        let a = coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();
        let b = coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_once_per_key() {
        let (coordinator, store) = coordinator_with(CountingConnector::new());
        coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                c.ensure_collection("facts", "w1", 16).await
            }));
        }

        for handle in handles {
            let state = handle.await.unwrap().unwrap();
            assert_eq!(state.status, CollectionStatus::Ready);
            assert_eq!(state.dimension, 16);
        }

        assert_eq!(store.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ready_fast_path_skips_backend() {
        let (coordinator, store) = coordinator_with(CountingConnector::new());
        coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();

        coordinator
            .ensure_collection("facts", "w1", 16)
            .await
            .unwrap();

        // Make the backend fail; the ready fast path must not touch it
        store.fail_info.store(true, Ordering::SeqCst);
        let state = coordinator
            .ensure_collection("facts", "w1", 16)
            .await
            .unwrap();
        assert_eq!(state.status, CollectionStatus::Ready);
    }

    #[tokio::test]
    async fn test_dimension_change_recreates_collection() {
        let (coordinator, store) = coordinator_with(CountingConnector::new());
        coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();

        coordinator
            .ensure_collection("facts", "w1", 16)
            .await
            .unwrap();
        coordinator
            .ensure_collection("facts", "w1", 32)
            .await
            .unwrap();

        assert_eq!(store.create_calls.load(Ordering::SeqCst), 2);
        let info = store.collection_info("facts").await.unwrap().unwrap();
        assert_eq!(info.dimension, 32);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_failures() {
        let connector = CountingConnector::failing(100);
        let coordinator = Arc::new(CollectionCoordinator::new(
            Arc::new(connector),
            CoordinatorConfig {
                breaker: BreakerConfig {
                    failure_threshold: 3,
                    cooldown: Duration::from_secs(60),
                },
                ..CoordinatorConfig::default()
            },
        ));

        for _ in 0..3 {
            let err = coordinator
                .get_connection("http://localhost:6334", None)
                .await
                .err()
                .unwrap();
            assert!(matches!(err, Error::Connection(_)));
        }

        // Breaker is now open: attempts are rejected without connecting
        let err = coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::CircuitOpen(_)));
    }

    #[tokio::test]
    async fn test_health_check_marks_inaccessible_collections() {
        let (coordinator, store) = coordinator_with(CountingConnector::new());
        coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();
        coordinator
            .ensure_collection("facts", "w1", 16)
            .await
            .unwrap();

        // Age the entry past the settle window, then break the backend
        coordinator.backdate("facts", "w1", Duration::from_secs(60));
        store.fail_info.store(true, Ordering::SeqCst);

        coordinator.run_health_checks().await;

        let state = coordinator.collection_status("facts", "w1").unwrap();
        assert_eq!(state.status, CollectionStatus::Error);
    }

    #[tokio::test]
    async fn test_idle_entries_are_evicted() {
        let (coordinator, _store) = coordinator_with(CountingConnector::new());
        coordinator
            .get_connection("http://localhost:6334", None)
            .await
            .unwrap();
        coordinator
            .ensure_collection("facts", "w1", 16)
            .await
            .unwrap();

        coordinator.backdate("facts", "w1", Duration::from_secs(6 * 60));
        coordinator.run_health_checks().await;

        assert!(coordinator.collection_status("facts", "w1").is_none());
    }

    #[tokio::test]
    async fn test_ensure_without_connection_fails() {
        let (coordinator, _store) = coordinator_with(CountingConnector::new());
        let err = coordinator
            .ensure_collection("facts", "w1", 16)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_in_memory_connector_roundtrip() {
        let connector = InMemoryConnector::new();
        let coordinator = Arc::new(CollectionCoordinator::new(
            Arc::new(connector),
            CoordinatorConfig::default(),
        ));
        coordinator
            .get_connection("mem://local", None)
            .await
            .unwrap();
        let state = coordinator
            .ensure_collection("facts", "w1", 8)
            .await
            .unwrap();
        assert_eq!(state.status, CollectionStatus::Ready);
    }
}
