//! Memory orchestration
//!
//! Composes the detector, extractor, resolver, scorer, and coordinator
//! into the engine's public surface: initialization, message intake,
//! background episode processing, fact ingestion, search, and cleanup.

use crate::config::MemoryConfig;
use crate::context::ContextGenerator;
use crate::embeddings::EmbeddingProvider;
use crate::episode::{DetectorConfig, EpisodeDetector};
use crate::extractor::FactExtractor;
use crate::fact::{ConversationFact, MemoryAction};
use crate::hints::{HintProvider, ProjectContext};
use crate::llm::TextGenerator;
use crate::message::Message;
use crate::resolver::{ConflictResolver, ResolverConfig};
use crate::retention::{spawn_interval_sweep, RetentionPolicy, RetentionSweeper};
use crate::scoring::{ScoredFact, TemporalScorer};
use engram_core::{Error, EventTime, Result};
use engram_vector::{CollectionCoordinator, Filter, VectorStore};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coarse engine state surfaced to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryState {
    /// Constructed, not yet started
    Standby,
    /// Connection and collection setup in progress
    Initializing,
    /// Collection confirmed ready; operations are served
    Indexed,
    /// Initialization failed; the message is human-readable
    Error(String),
}

impl MemoryState {
    /// Human-readable status line
    pub fn describe(&self) -> String {
        match self {
            MemoryState::Standby => "memory engine idle".to_string(),
            MemoryState::Initializing => "preparing memory collection".to_string(),
            MemoryState::Indexed => "memory ready".to_string(),
            MemoryState::Error(message) => format!("memory unavailable: {message}"),
        }
    }
}

/// Counts of applied storage actions for one ingestion batch
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub added: usize,
    pub updated: usize,
    pub superseded: usize,
    pub deleted: usize,
    pub ignored: usize,
}

impl IngestReport {
    /// Facts that ended up stored (new or rewritten)
    pub fn stored(&self) -> usize {
        self.added + self.updated
    }
}

/// Per-workspace message intake state
struct Intake {
    buffer: Vec<Message>,
    /// Single-slot in-flight marker for the background pass
    running: bool,
}

/// The memory engine's public facade for one workspace
///
/// Owns per-workspace state (buffer, in-flight pass); shares the
/// [`CollectionCoordinator`] with every other workspace in the process.
/// Cloning is cheap; clones share the same state and buffer, which is
/// how the background pass gets an owned handle to run on.
#[derive(Clone)]
pub struct MemoryOrchestrator {
    config: MemoryConfig,
    coordinator: Arc<CollectionCoordinator>,
    embeddings: Arc<dyn EmbeddingProvider>,
    detector: EpisodeDetector,
    extractor: FactExtractor,
    scorer: TemporalScorer,
    project: Option<ProjectContext>,
    state: Arc<Mutex<MemoryState>>,
    init_lock: Arc<AsyncMutex<()>>,
    intake: Arc<Mutex<Intake>>,
}

impl MemoryOrchestrator {
    /// Create an orchestrator; fails fast on invalid configuration
    pub fn new(
        config: MemoryConfig,
        coordinator: Arc<CollectionCoordinator>,
        embeddings: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
        hints: Arc<dyn HintProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let context = ContextGenerator::with_generator(Arc::clone(&generator), hints);
        let mut detector = EpisodeDetector::new(DetectorConfig::from(&config), context);
        if config.semantic_boundaries {
            detector = detector.with_embeddings(Arc::clone(&embeddings));
        }
        if config.verify_boundaries {
            detector = detector.with_generator(Arc::clone(&generator));
        }

        let extractor = FactExtractor::new(generator, config.max_transcript_chars);
        let scorer = TemporalScorer::new(config.similarity_weight, config.half_life_days);

        Ok(Self {
            config,
            coordinator,
            embeddings,
            detector,
            extractor,
            scorer,
            project: None,
            state: Arc::new(Mutex::new(MemoryState::Standby)),
            init_lock: Arc::new(AsyncMutex::new(())),
            intake: Arc::new(Mutex::new(Intake {
                buffer: Vec::new(),
                running: false,
            })),
        })
    }

    /// Builder: attach project metadata for extraction and descriptions
    pub fn with_project(mut self, project: ProjectContext) -> Self {
        self.project = Some(project);
        self
    }

    /// Current engine state
    pub fn status(&self) -> MemoryState {
        self.state.lock().map(|s| s.clone()).unwrap_or_else(|_| {
            MemoryState::Error("state lock poisoned".to_string())
        })
    }

    /// Messages currently buffered and not yet processed
    pub fn buffered_messages(&self) -> usize {
        self.intake.lock().map(|i| i.buffer.len()).unwrap_or(0)
    }

    fn set_state(&self, state: MemoryState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Initialize the engine: connect, then confirm the collection
    ///
    /// Idempotent; concurrent callers coalesce on a single
    /// initialization. `Indexed` is reached only after the collection is
    /// confirmed ready, bounded by the configured timeout.
    pub async fn start(&self) -> Result<()> {
        if self.status() == MemoryState::Indexed {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.status() == MemoryState::Indexed {
            return Ok(());
        }

        self.set_state(MemoryState::Initializing);
        match self.initialize().await {
            Ok(()) => {
                info!(
                    "Memory engine ready for workspace {}",
                    self.config.workspace_id
                );
                self.set_state(MemoryState::Indexed);
                Ok(())
            }
            Err(e) => {
                warn!("Memory engine initialization failed: {}", e);
                self.set_state(MemoryState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn initialize(&self) -> Result<()> {
        self.coordinator
            .get_connection(&self.config.endpoint, self.config.credential.as_deref())
            .await?;

        let collection = self.config.collection_name();
        let dimension = self.embeddings.dimensions();

        match tokio::time::timeout(
            self.config.init_timeout,
            self.coordinator
                .ensure_collection(&collection, &self.config.workspace_id, dimension),
        )
        .await
        {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(Error::Timeout(format!(
                "collection setup for {collection} did not finish within {:?}",
                self.config.init_timeout
            ))),
        }
    }

    /// Await initialization and return the live store handle
    async fn ensure_ready(&self) -> Result<Arc<dyn VectorStore>> {
        if self.status() != MemoryState::Indexed {
            self.start().await?;
        }
        self.coordinator
            .store()
            .await
            .ok_or_else(|| Error::Connection("vector store connection lost".to_string()))
    }

    // ========== Message intake ==========

    /// Buffer a message and schedule a background pass when enough have
    /// accumulated
    ///
    /// At most one pass runs at a time; a failed pass leaves the buffer
    /// intact for the next attempt.
    pub async fn collect_message(&self, message: Message) -> Result<()> {
        self.ensure_ready().await?;

        let should_spawn = {
            let mut intake = self
                .intake
                .lock()
                .map_err(|_| Error::Internal("intake lock poisoned".to_string()))?;
            intake.buffer.push(message);
            if intake.buffer.len() >= self.config.min_batch_messages && !intake.running {
                intake.running = true;
                true
            } else {
                false
            }
        };

        if should_spawn {
            let this = self.clone();
            tokio::spawn(async move {
                match this.process_claimed_snapshot().await {
                    Ok(count) => debug!("Background pass ingested {} facts", count),
                    Err(e) => warn!("Background pass failed, buffer retained: {}", e),
                }
            });
        }

        Ok(())
    }

    /// Process the buffer now, if no pass is already running
    ///
    /// Returns the number of facts ingested. Useful at shutdown and in
    /// tests where waiting for the background task is not an option.
    pub async fn flush(&self) -> Result<usize> {
        {
            let mut intake = self
                .intake
                .lock()
                .map_err(|_| Error::Internal("intake lock poisoned".to_string()))?;
            if intake.running || intake.buffer.is_empty() {
                return Ok(0);
            }
            intake.running = true;
        }
        self.process_claimed_snapshot().await
    }

    /// Run one pass over a snapshot of the buffer. The in-flight slot
    /// must already be claimed; it is always released, and processed
    /// messages are evicted only on success.
    async fn process_claimed_snapshot(&self) -> Result<usize> {
        let snapshot: Vec<Message> = match self.intake.lock() {
            Ok(intake) => intake.buffer.clone(),
            Err(_) => Vec::new(),
        };

        let outcome = self.process_messages(&snapshot).await;

        if let Ok(mut intake) = self.intake.lock() {
            intake.running = false;
            if outcome.is_ok() {
                let processed = snapshot.len().min(intake.buffer.len());
                intake.buffer.drain(..processed);
            }
        }

        outcome
    }

    async fn process_messages(&self, messages: &[Message]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let episodes = self
            .detector
            .detect(messages, &self.config.workspace_id, self.project.as_ref())
            .await?;

        let mut total = 0;
        for episode in episodes {
            let inputs = self
                .extractor
                .extract(&episode.messages, self.project.as_ref())
                .await;
            if inputs.is_empty() {
                continue;
            }

            let facts: Vec<ConversationFact> = inputs
                .iter()
                .map(|input| {
                    ConversationFact::from_input(&self.config.workspace_id, input)
                        .with_reference_time(episode.reference_time)
                        .with_derived_from(&episode.id.to_string())
                        .with_metadata("episode_context", episode.context_description.clone())
                })
                .collect();

            let report = self.ingest_facts(facts).await?;
            total += report.stored();
        }

        Ok(total)
    }

    // ========== Ingestion ==========

    /// Embed, resolve, and store a batch of facts
    ///
    /// Facts missing embeddings are embedded in one batch call; an
    /// embedding failure is critical and propagates, since a fact cannot
    /// be stored without a vector. Resolution is strictly sequential per
    /// fact because each outcome can change the store the next fact is
    /// resolved against.
    pub async fn ingest_facts(&self, mut facts: Vec<ConversationFact>) -> Result<IngestReport> {
        let store = self.ensure_ready().await?;

        let missing: Vec<usize> = facts
            .iter()
            .enumerate()
            .filter(|(_, f)| f.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| facts[i].content.clone()).collect();
            let vectors = self
                .embeddings
                .embed_batch(&texts)
                .await
                .map_err(|e| Error::Embedding(format!("cannot store facts without vectors: {e}")))?;
            if vectors.len() != texts.len() {
                return Err(Error::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            for (&i, vector) in missing.iter().zip(vectors) {
                facts[i].embedding = Some(vector);
            }
        }

        let resolver = ConflictResolver::new(
            Arc::clone(&store),
            &self.config.collection_name(),
            ResolverConfig::from(&self.config),
        );

        let mut report = IngestReport::default();
        for fact in facts {
            let actions = resolver.resolve(&fact).await?;
            for action in actions {
                self.apply_action(&store, action, &mut report).await?;
            }
        }

        debug!(
            "Ingestion for {}: {} added, {} superseded, {} deleted, {} ignored",
            self.config.workspace_id,
            report.added,
            report.superseded,
            report.deleted,
            report.ignored
        );
        Ok(report)
    }

    async fn apply_action(
        &self,
        store: &Arc<dyn VectorStore>,
        action: MemoryAction,
        report: &mut IngestReport,
    ) -> Result<()> {
        let collection = self.config.collection_name();
        match action {
            MemoryAction::Add { fact, .. } => {
                store.upsert(&collection, fact.to_record()?).await?;
                report.added += 1;
            }
            MemoryAction::Ignore { reasoning } => {
                debug!("Ignoring fact: {}", reasoning);
                report.ignored += 1;
            }
            MemoryAction::Update {
                mut fact,
                target_id,
                ..
            } => {
                fact.id = target_id;
                store.update(&collection, fact.to_record()?).await?;
                report.updated += 1;
            }
            MemoryAction::Supersede {
                fact, target_ids, ..
            } => {
                for target in &target_ids {
                    if let Some(record) = store.get(&collection, &target.to_string()).await? {
                        let mut old = ConversationFact::from_record(&record)?;
                        old.mark_superseded(fact.id);
                        store.update(&collection, old.to_record()?).await?;
                    }
                }
                store.upsert(&collection, fact.to_record()?).await?;
                report.superseded += target_ids.len();
                report.added += 1;
            }
            MemoryAction::DeleteExisting {
                fact, target_ids, ..
            } => {
                for target in &target_ids {
                    store.delete(&collection, &target.to_string()).await?;
                }
                // The resolution itself is what the workspace keeps
                store.upsert(&collection, fact.to_record()?).await?;
                report.deleted += target_ids.len();
                report.added += 1;
            }
        }
        Ok(())
    }

    // ========== Search ==========

    /// Similarity search re-ranked by temporal relevance
    ///
    /// A read path: provider or backend trouble degrades to an empty
    /// result instead of an error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredFact>> {
        let store = self.ensure_ready().await?;
        let collection = self.config.collection_name();

        let embedding = match self.embeddings.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Query embedding failed, returning no results: {}", e);
                return Ok(Vec::new());
            }
        };

        // Validate against the registered dimension before touching the
        // backend at all
        if let Some(state) = self
            .coordinator
            .collection_status(&collection, &self.config.workspace_id)
        {
            if embedding.len() != state.dimension {
                warn!(
                    "Query vector length {} does not match collection dimension {}",
                    embedding.len(),
                    state.dimension
                );
                return Ok(Vec::new());
            }
        }

        let filter = Filter::new().must_eq("workspace", self.config.workspace_id.as_str());
        let hits = match store.search(&collection, &embedding, limit, &filter).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Vector search failed, returning no results: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut pairs = Vec::new();
        for hit in hits {
            match ConversationFact::from_record(&hit.record) {
                Ok(fact) => pairs.push((fact, hit.score)),
                Err(e) => warn!("Skipping malformed search hit: {}", e),
            }
        }

        let mut ranked = self.scorer.rank(pairs, EventTime::now());
        ranked.truncate(limit);
        Ok(ranked)
    }

    // ========== Maintenance ==========

    /// Delete every stored fact and drop the buffered messages
    pub async fn clear_memory_data(&self) -> Result<usize> {
        let store = self.ensure_ready().await?;
        if let Ok(mut intake) = self.intake.lock() {
            intake.buffer.clear();
        }
        let removed = store
            .clear_collection(&self.config.collection_name())
            .await?;
        info!(
            "Cleared {} facts for workspace {}",
            removed, self.config.workspace_id
        );
        Ok(removed)
    }

    /// Spawn the periodic retention sweeper for this workspace
    pub async fn spawn_retention_sweeper(&self) -> Result<JoinHandle<()>> {
        let store = self.ensure_ready().await?;
        let sweeper = Arc::new(RetentionSweeper::new(
            store,
            &self.config.collection_name(),
            RetentionPolicy::from(&self.config),
        ));
        Ok(spawn_interval_sweep(
            sweeper,
            self.config.workspace_id.clone(),
            self.config.sweep_interval,
        ))
    }
}
