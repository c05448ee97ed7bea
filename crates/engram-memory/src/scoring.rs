//! Temporal relevance scoring
//!
//! Search results are ranked by a blend of vector similarity and a
//! recency/confidence weight that decays exponentially with age.

use crate::fact::ConversationFact;
use engram_core::EventTime;

/// A search hit with its score breakdown
#[derive(Debug, Clone)]
pub struct ScoredFact {
    pub fact: ConversationFact,
    pub similarity: f32,
    pub temporal: f64,
    /// Blended score used for ranking
    pub score: f64,
}

/// Computes temporal scores and blended rankings
#[derive(Debug, Clone)]
pub struct TemporalScorer {
    /// Weight of similarity in the blend (alpha); the temporal score
    /// gets the remainder
    pub similarity_weight: f64,

    /// Half-life of the temporal score, in days
    pub half_life_days: f64,
}

impl Default for TemporalScorer {
    fn default() -> Self {
        Self {
            similarity_weight: 0.65,
            half_life_days: 30.0,
        }
    }
}

impl TemporalScorer {
    pub fn new(similarity_weight: f64, half_life_days: f64) -> Self {
        Self {
            similarity_weight,
            half_life_days,
        }
    }

    /// Temporal score in [0, 1]: confidence discounted by age
    ///
    /// Monotonically decreasing with age; a fact at its half-life scores
    /// half its confidence. Future-dated facts score as if brand new.
    pub fn temporal_score(
        &self,
        reference_time: EventTime,
        confidence: f64,
        now: EventTime,
    ) -> f64 {
        let age_days = reference_time.age_days(now).max(0.0);
        confidence.clamp(0.0, 1.0) * 0.5f64.powf(age_days / self.half_life_days)
    }

    /// Blend similarity and temporal score
    pub fn blend(&self, similarity: f64, temporal: f64) -> f64 {
        self.similarity_weight * similarity + (1.0 - self.similarity_weight) * temporal
    }

    /// Re-rank search hits by blended score, descending
    ///
    /// The sort is stable, so ties keep their incoming (insertion)
    /// order.
    pub fn rank(
        &self,
        hits: Vec<(ConversationFact, f32)>,
        now: EventTime,
    ) -> Vec<ScoredFact> {
        let mut scored: Vec<ScoredFact> = hits
            .into_iter()
            .map(|(fact, similarity)| {
                let temporal = self.temporal_score(fact.reference_time, fact.confidence, now);
                let score = self.blend(similarity as f64, temporal);
                ScoredFact {
                    fact,
                    similarity,
                    temporal,
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }
}
