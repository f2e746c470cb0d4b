//! Rare-node scoring: rank nodes by an information-density heuristic.
//!
//! A node's score is
//!
//! ```text
//! score = (1 / total_degree) * type_weight(main_label) * bonus
//! bonus = 1.0 + 0.3·[has_definition] + 0.2·[has_function]
//! ```
//!
//! so loosely connected, well documented nodes of legally substantive types rise
//! to the top, and generic hubs sink. The top fraction of the ranking becomes
//! the seed set for backward walks.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::error::ScoreError;

use super::{AggregateSpec, DegreeRecord, GraphGateway};

/// Bonus for a non-empty definition attribute.
pub const DEFINITION_BONUS: f64 = 0.3;
/// Bonus for a non-empty function attribute.
pub const FUNCTION_BONUS: f64 = 0.2;

/// A node with its degree counts and rarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub element_id: String,
    pub name: String,
    /// Main label, `"Unknown"` for unlabeled nodes.
    pub label: String,
    pub in_degree: usize,
    pub out_degree: usize,
    /// Always `in_degree + out_degree`.
    pub total_degree: usize,
    pub has_definition: bool,
    pub has_function: bool,
    pub score: f64,
}

/// All qualifying nodes, sorted by descending score.
#[derive(Debug, Clone)]
pub struct RareNodeSet {
    ranked: Vec<ScoredNode>,
}

impl RareNodeSet {
    /// The full ranking.
    pub fn ranked(&self) -> &[ScoredNode] {
        &self.ranked
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Number of nodes kept for a given fraction: `max(1, floor(len * top_percent))`.
    pub fn top_count(&self, top_percent: f64) -> usize {
        let n = (self.ranked.len() as f64 * top_percent).floor() as usize;
        n.max(1).min(self.ranked.len())
    }

    /// The leading `top_percent` of the ranking; at least one node.
    pub fn select_top(&self, top_percent: f64) -> &[ScoredNode] {
        &self.ranked[..self.top_count(top_percent)]
    }
}

/// Multiplicative documentation bonus.
pub fn documentation_bonus(has_definition: bool, has_function: bool) -> f64 {
    let mut bonus = 1.0;
    if has_definition {
        bonus += DEFINITION_BONUS;
    }
    if has_function {
        bonus += FUNCTION_BONUS;
    }
    bonus
}

/// Scores nodes according to a [`ScoringConfig`].
#[derive(Debug, Clone)]
pub struct RareNodeScorer<'a> {
    config: &'a ScoringConfig,
}

impl<'a> RareNodeScorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    /// Score one aggregate row. `None` if it falls below `min_degree`.
    ///
    /// A node with zero total degree is never scored, even with `min_degree = 0`,
    /// since its score would be unbounded.
    pub fn score(&self, record: &DegreeRecord) -> Option<ScoredNode> {
        let total_degree = record.in_degree + record.out_degree;
        if total_degree < self.config.min_degree || total_degree == 0 {
            return None;
        }

        let label = record
            .labels
            .first()
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let weight = self.config.type_weight(&label);
        let bonus = documentation_bonus(record.has_definition, record.has_function);
        let score = (1.0 / total_degree as f64) * weight * bonus;

        Some(ScoredNode {
            element_id: record.element_id.clone(),
            name: record.name.clone(),
            label,
            in_degree: record.in_degree,
            out_degree: record.out_degree,
            total_degree,
            has_definition: record.has_definition,
            has_function: record.has_function,
            score,
        })
    }

    /// Score every named node in the graph and rank by descending score.
    ///
    /// Ties keep gateway order. Fails with [`ScoreError::EligibilityExhausted`]
    /// when nothing qualifies.
    pub fn score_all_nodes<G: GraphGateway>(
        &self,
        gateway: &G,
    ) -> Result<RareNodeSet, ScoreError> {
        let spec = AggregateSpec {
            definition_property: self.config.definition_property.clone(),
            function_property: self.config.function_property.clone(),
        };
        let records = gateway.aggregate_degrees(&spec)?;
        self.rank(&records)
    }

    /// Rank already aggregated rows.
    pub fn rank(&self, records: &[DegreeRecord]) -> Result<RareNodeSet, ScoreError> {
        let mut ranked: Vec<ScoredNode> = records.iter().filter_map(|r| self.score(r)).collect();

        if ranked.is_empty() {
            return Err(ScoreError::EligibilityExhausted {
                min_degree: self.config.min_degree,
                examined: records.len(),
            });
        }

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            examined = records.len(),
            qualified = ranked.len(),
            "scored nodes"
        );
        Ok(RareNodeSet { ranked })
    }
}
