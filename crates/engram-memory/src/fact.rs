//! Durable conversation facts
//!
//! A fact is the unit the engine persists: a categorized, embedded
//! statement extracted from conversation, carrying lifecycle stamps for
//! supersession and resolution.

use engram_core::{Error, EventTime, IngestTime, Result};
use engram_vector::VectorRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fact identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactId(Uuid);

impl FactId {
    /// Create a new random fact ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get as UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    /// Tools, services, and frameworks the project runs on
    Infrastructure,
    /// Design decisions; newer statements supersede older ones
    Architecture,
    /// Transient problem reports; removed once resolved
    Debugging,
    /// Recurring conventions and practices (the default)
    Pattern,
}

impl FactCategory {
    pub const ALL: [FactCategory; 4] = [
        FactCategory::Infrastructure,
        FactCategory::Architecture,
        FactCategory::Debugging,
        FactCategory::Pattern,
    ];

    /// Stable lowercase name, used in store payloads and filters
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::Infrastructure => "infrastructure",
            FactCategory::Architecture => "architecture",
            FactCategory::Debugging => "debugging",
            FactCategory::Pattern => "pattern",
        }
    }

    /// Parse a category name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "infrastructure" => Some(FactCategory::Infrastructure),
            "architecture" => Some(FactCategory::Architecture),
            "debugging" => Some(FactCategory::Debugging),
            "pattern" => Some(FactCategory::Pattern),
            _ => None,
        }
    }
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sanitized fact candidate produced by extraction
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedFactInput {
    pub content: String,
    pub category: FactCategory,
    pub confidence: f64,
}

/// A durable, categorized, embedded statement derived from conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationFact {
    pub id: FactId,
    pub content: String,
    pub category: FactCategory,

    /// Extraction confidence in [0, 1]
    pub confidence: f64,

    /// When the underlying conversation happened
    pub reference_time: EventTime,

    /// When the fact entered the store
    pub ingestion_time: IngestTime,

    pub workspace_id: String,

    /// Embedding vector; required before the fact can be stored
    pub embedding: Option<Vec<f32>>,

    /// Extension data with no dedicated field
    pub metadata: Map<String, Value>,

    /// Set when a newer fact replaced this one; the fact stays for audit
    /// until retention deletes it
    pub superseded_by: Option<FactId>,
    pub superseded_at: Option<IngestTime>,

    /// Debugging lifecycle: the underlying problem was resolved
    pub resolved: bool,
    pub resolved_at: Option<EventTime>,

    /// Episode this fact was extracted from
    pub derived_from: Option<String>,

    /// Whether a pattern fact has already been derived from this one
    pub derived_pattern_created: bool,
}

impl ConversationFact {
    /// Create a new fact
    pub fn new(
        workspace_id: &str,
        content: &str,
        category: FactCategory,
        confidence: f64,
    ) -> Self {
        Self {
            id: FactId::new(),
            content: content.to_string(),
            category,
            confidence: confidence.clamp(0.0, 1.0),
            reference_time: EventTime::now(),
            ingestion_time: IngestTime::now(),
            workspace_id: workspace_id.to_string(),
            embedding: None,
            metadata: Map::new(),
            superseded_by: None,
            superseded_at: None,
            resolved: false,
            resolved_at: None,
            derived_from: None,
            derived_pattern_created: false,
        }
    }

    /// Create from a sanitized extraction candidate
    pub fn from_input(workspace_id: &str, input: &CategorizedFactInput) -> Self {
        Self::new(workspace_id, &input.content, input.category, input.confidence)
    }

    /// Builder: set the reference time
    pub fn with_reference_time(mut self, time: EventTime) -> Self {
        self.reference_time = time;
        self
    }

    /// Builder: attach an embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Builder: record the episode this fact came from
    pub fn with_derived_from(mut self, episode_id: &str) -> Self {
        self.derived_from = Some(episode_id.to_string());
        self
    }

    /// Builder: add a metadata entry
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// A fact with `superseded_by` set is logically inactive
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Stamp this fact as superseded by a newer one
    pub fn mark_superseded(&mut self, by: FactId) {
        self.superseded_by = Some(by);
        self.superseded_at = Some(IngestTime::now());
    }

    /// Stamp this fact as resolved
    pub fn mark_resolved(&mut self, at: EventTime) {
        self.resolved = true;
        self.resolved_at = Some(at);
    }

    /// Convert to a store record; errors when no embedding is attached
    pub fn to_record(&self) -> Result<VectorRecord> {
        let vector = self.embedding.clone().ok_or_else(|| {
            Error::MemoryOperation(format!("fact {} has no embedding", self.id))
        })?;
        Ok(VectorRecord::new(
            self.id.to_string(),
            vector,
            self.payload(),
        ))
    }

    /// The JSON payload stored alongside the vector
    pub fn payload(&self) -> Value {
        let payload = FactPayload {
            content: self.content.clone(),
            category: self.category.as_str().to_string(),
            confidence: self.confidence,
            reference_time: self.reference_time.as_millis(),
            ingestion_time: self.ingestion_time.as_millis(),
            workspace: self.workspace_id.clone(),
            metadata: self.metadata.clone(),
            superseded_by: self.superseded_by.map(|id| id.to_string()),
            superseded_at: self.superseded_at.map(|t| t.as_millis()),
            resolved: self.resolved,
            resolved_at: self.resolved_at.map(|t| t.as_millis()),
            derived_from: self.derived_from.clone(),
            derived_pattern_created: self.derived_pattern_created,
        };
        serde_json::to_value(payload).unwrap_or(Value::Null)
    }

    /// Rebuild a fact from a store record
    ///
    /// A payload missing required fields, or carrying an unknown
    /// category or a malformed id, is reported as data corruption.
    pub fn from_record(record: &VectorRecord) -> Result<Self> {
        let payload: FactPayload =
            serde_json::from_value(record.payload.clone()).map_err(|e| {
                Error::DataCorruption(format!(
                    "fact payload for record {} is malformed: {e}",
                    record.id
                ))
            })?;

        let uuid = Uuid::parse_str(&record.id).map_err(|_| {
            Error::DataCorruption(format!("record id {} is not a valid fact id", record.id))
        })?;

        let category = FactCategory::parse(&payload.category).ok_or_else(|| {
            Error::DataCorruption(format!(
                "record {} has unknown category {:?}",
                record.id, payload.category
            ))
        })?;

        let superseded_by = match payload.superseded_by {
            Some(raw) => Some(FactId::from_uuid(Uuid::parse_str(&raw).map_err(|_| {
                Error::DataCorruption(format!(
                    "record {} has malformed superseded_by {raw:?}",
                    record.id
                ))
            })?)),
            None => None,
        };

        Ok(Self {
            id: FactId::from_uuid(uuid),
            content: payload.content,
            category,
            confidence: payload.confidence,
            reference_time: EventTime::from_millis(payload.reference_time),
            ingestion_time: IngestTime::from_millis(payload.ingestion_time),
            workspace_id: payload.workspace,
            embedding: Some(record.vector.clone()),
            metadata: payload.metadata,
            superseded_by,
            superseded_at: payload.superseded_at.map(IngestTime::from_millis),
            resolved: payload.resolved,
            resolved_at: payload.resolved_at.map(EventTime::from_millis),
            derived_from: payload.derived_from,
            derived_pattern_created: payload.derived_pattern_created,
        })
    }
}

/// Wire shape of a fact payload in the vector store
#[derive(Serialize, Deserialize)]
struct FactPayload {
    content: String,
    category: String,
    confidence: f64,
    reference_time: i64,
    ingestion_time: i64,
    workspace: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    superseded_by: Option<String>,
    #[serde(default)]
    superseded_at: Option<i64>,
    #[serde(default)]
    resolved: bool,
    #[serde(default)]
    resolved_at: Option<i64>,
    #[serde(default)]
    derived_from: Option<String>,
    #[serde(default)]
    derived_pattern_created: bool,
}

/// How a candidate fact interacts with the store
///
/// Produced by conflict resolution and consumed within a single
/// ingestion step.
#[derive(Debug, Clone)]
pub enum MemoryAction {
    /// Insert as a new fact
    Add {
        fact: ConversationFact,
        reasoning: String,
    },
    /// Replace an existing fact's content in place
    Update {
        fact: ConversationFact,
        target_id: FactId,
        reasoning: String,
    },
    /// Insert the new fact and stamp the targets as superseded
    Supersede {
        fact: ConversationFact,
        target_ids: Vec<FactId>,
        reasoning: String,
    },
    /// Insert the new fact and hard-delete the targets
    DeleteExisting {
        fact: ConversationFact,
        target_ids: Vec<FactId>,
        reasoning: String,
    },
    /// Exact duplicate; do nothing
    Ignore { reasoning: String },
}

impl MemoryAction {
    /// Short action name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryAction::Add { .. } => "add",
            MemoryAction::Update { .. } => "update",
            MemoryAction::Supersede { .. } => "supersede",
            MemoryAction::DeleteExisting { .. } => "delete_existing",
            MemoryAction::Ignore { .. } => "ignore",
        }
    }
}
