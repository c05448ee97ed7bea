//! Retention sweeping
//!
//! Debugging facts are transient: resolved ones are kept for a short
//! audit window, unresolved ones eventually go stale. The sweeper walks
//! the workspace's debugging facts page by page and deletes the ones
//! whose lifecycle has expired.
//!
//! Errors are not swallowed here: a scan or delete failure aborts the
//! run and propagates, and a malformed stored payload is treated as data
//! corruption rather than skipped. The interval wrapper logs failures
//! and retries on the next tick.

use crate::config::MemoryConfig;
use crate::fact::{ConversationFact, FactCategory};
use engram_core::{EventTime, Result};
use engram_vector::{Filter, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Retention thresholds, lifted from [`MemoryConfig`]
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// How long resolved debugging facts are kept after resolution
    pub resolved_retention: Duration,

    /// How long unresolved debugging facts are kept
    pub stale_retention: Duration,

    /// Page size for the scan
    pub page_size: usize,
}

impl From<&MemoryConfig> for RetentionPolicy {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            resolved_retention: config.resolved_retention,
            stale_retention: config.stale_retention,
            page_size: config.sweep_page_size,
        }
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub deleted: usize,
}

/// Deletes expired debugging facts
pub struct RetentionSweeper {
    store: Arc<dyn VectorStore>,
    collection: String,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    /// Create a sweeper over a collection
    pub fn new(store: Arc<dyn VectorStore>, collection: &str, policy: RetentionPolicy) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            policy,
        }
    }

    /// Sweep a workspace's debugging facts now
    pub async fn sweep_workspace(&self, workspace: &str) -> Result<SweepOutcome> {
        self.sweep_workspace_at(workspace, EventTime::now()).await
    }

    /// Sweep with an explicit clock, for boundary-exact behavior
    ///
    /// Deletion uses strictly-greater-than comparisons: a fact aged
    /// exactly the threshold survives, one millisecond past it does not.
    pub async fn sweep_workspace_at(
        &self,
        workspace: &str,
        now: EventTime,
    ) -> Result<SweepOutcome> {
        let filter = Filter::new()
            .must_eq("workspace", workspace)
            .must_eq("category", FactCategory::Debugging.as_str());

        let mut outcome = SweepOutcome::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .store
                .filter(
                    &self.collection,
                    self.policy.page_size,
                    &filter,
                    cursor.as_deref(),
                )
                .await?;

            for record in &page.records {
                outcome.scanned += 1;

                // Malformed payloads fail the sweep loudly; silently
                // skipping would mask store corruption
                let fact = ConversationFact::from_record(record)?;

                if self.is_expired(&fact, now) {
                    self.store.delete(&self.collection, &record.id).await?;
                    outcome.deleted += 1;
                    debug!(
                        "Retention deleted debugging fact {} ({})",
                        record.id,
                        if fact.resolved { "resolved" } else { "stale" }
                    );
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if outcome.deleted > 0 {
            info!(
                "Retention sweep for {} deleted {}/{} debugging facts",
                workspace, outcome.deleted, outcome.scanned
            );
        }

        Ok(outcome)
    }

    fn is_expired(&self, fact: &ConversationFact, now: EventTime) -> bool {
        if fact.resolved {
            let basis = fact.resolved_at.unwrap_or(fact.reference_time);
            let age_millis = now.as_millis() - basis.as_millis();
            age_millis > self.policy.resolved_retention.as_millis() as i64
        } else {
            let age_millis = now.as_millis() - fact.reference_time.as_millis();
            age_millis > self.policy.stale_retention.as_millis() as i64
        }
    }
}

/// Run the sweeper on an interval, logging and retrying on failure
pub fn spawn_interval_sweep(
    sweeper: Arc<RetentionSweeper>,
    workspace: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the engine has a
        // chance to finish initialization first
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweeper.sweep_workspace(&workspace).await {
                Ok(outcome) => {
                    debug!(
                        "Retention sweep finished: scanned {}, deleted {}",
                        outcome.scanned, outcome.deleted
                    );
                }
                Err(e) => {
                    warn!("Retention sweep failed, retrying next interval: {}", e);
                }
            }
        }
    })
}
