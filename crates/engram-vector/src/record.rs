//! Record and filter types for the vector store contract

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single point in a collection: an id, an embedding, and a JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier within the collection
    pub id: String,

    /// Embedding vector; length must match the collection dimension
    pub vector: Vec<f32>,

    /// Payload fields, filterable by equality
    pub payload: Value,
}

impl VectorRecord {
    /// Create a new record
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: Value) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }

    /// Read a top-level payload field as a string
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// A record returned from similarity search, with its score
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    /// Similarity score, higher is more similar
    pub score: f32,
}

/// One page of a filtered scan
#[derive(Debug, Clone)]
pub struct FilterPage {
    pub records: Vec<VectorRecord>,
    /// Opaque cursor for the next page; `None` when the scan is exhausted
    pub next_cursor: Option<String>,
}

/// Collection metadata as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub record_count: usize,
}

/// An equality conjunction over payload fields
///
/// Every condition must match for a record to pass. An empty filter
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a payload field to equal a value
    pub fn must_eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    /// The conditions in this filter
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Check whether a payload satisfies every condition
    pub fn matches(&self, payload: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| payload.get(key) == Some(expected))
    }

    /// True when the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
