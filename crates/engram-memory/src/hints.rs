//! Workspace vocabulary hints
//!
//! Episode descriptions get more specific when they can mention the
//! workspace's actual dependencies, directories, and recurring terms.
//! Hints are strictly best-effort: a provider that cannot produce them
//! returns the empty set, never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Project metadata handed in by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Project name
    pub name: String,

    /// Short free-form description
    pub description: Option<String>,

    /// Languages/frameworks in use
    pub languages: Vec<String>,
}

impl ProjectContext {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Vocabulary describing a workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceHints {
    /// Dependency names
    pub deps: Vec<String>,

    /// Top-level directories
    pub dirs: Vec<String>,

    /// Recurring terms from previously stored facts
    pub tags: Vec<String>,
}

impl WorkspaceHints {
    /// True when no hints are available
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty() && self.dirs.is_empty() && self.tags.is_empty()
    }

    /// All hint terms, in deps → dirs → tags order
    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.deps
            .iter()
            .chain(self.dirs.iter())
            .chain(self.tags.iter())
            .map(String::as_str)
    }
}

/// Best-effort source of workspace vocabulary
#[async_trait]
pub trait HintProvider: Send + Sync {
    /// Produce hints for the workspace; infallible by construction
    async fn hints(&self, project: Option<&ProjectContext>) -> WorkspaceHints;
}

/// Provider that never has hints
pub struct NoHints;

#[async_trait]
impl HintProvider for NoHints {
    async fn hints(&self, _project: Option<&ProjectContext>) -> WorkspaceHints {
        WorkspaceHints::default()
    }
}

/// Provider over a fixed hint set
pub struct StaticHints {
    hints: WorkspaceHints,
}

impl StaticHints {
    pub fn new(hints: WorkspaceHints) -> Self {
        Self { hints }
    }
}

#[async_trait]
impl HintProvider for StaticHints {
    async fn hints(&self, _project: Option<&ProjectContext>) -> WorkspaceHints {
        self.hints.clone()
    }
}
