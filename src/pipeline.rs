//! Batch driver: score the graph, then walk every seed.
//!
//! Walks are independent, so seeds are spread over a bounded rayon pool. Every
//! worker opens its own gateway session and every seed gets its own RNG, derived
//! from `batch.rng_seed` and the seed's position when one is configured, so a
//! seeded run writes the same corpus regardless of the worker count.
//!
//! A failing seed never stops the batch: gateway errors are logged, counted in
//! the [`RunSummary`], and the next seed is walked.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::{BatchConfig, ScoringConfig, WalkConfig};
use crate::corpus::{JsonlWriter, PathRecord};
use crate::error::{ConfigError, RarepathResult, WalkError};
use crate::graph::rarity::{RareNodeScorer, RareNodeSet};
use crate::graph::walk::{BackwardWalker, EvidencePath, WalkOutcome};
use crate::graph::{GatewaySource, GraphGateway};

/// Score every node and log a preview of the ranking.
pub fn score_graph<G: GraphGateway>(
    gateway: &G,
    config: &ScoringConfig,
) -> RarepathResult<RareNodeSet> {
    let ranked = RareNodeScorer::new(config).score_all_nodes(gateway)?;
    let selected = ranked.top_count(config.top_percent);
    tracing::info!(
        qualified = ranked.len(),
        selected,
        top_percent = config.top_percent,
        "scored graph nodes"
    );
    for node in ranked.ranked().iter().take(5) {
        tracing::info!(
            name = %node.name,
            label = %node.label,
            total_degree = node.total_degree,
            score = node.score,
            element_id = %node.element_id,
            "top rare node"
        );
    }
    Ok(ranked)
}

/// Per-run counts reported to the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub seeds_attempted: usize,
    /// Paths written, including partial paths salvaged from failed walks.
    pub paths_accepted: usize,
    pub too_short: usize,
    pub seeds_missing: usize,
    /// Walks aborted by a gateway failure.
    pub failures: usize,
    /// Accepted path length → count.
    pub length_distribution: BTreeMap<usize, usize>,
    /// Rendering of the first accepted path.
    pub example: Option<String>,
}

impl RunSummary {
    fn accept(&mut self, path: &EvidencePath) {
        self.paths_accepted += 1;
        *self.length_distribution.entry(path.len()).or_default() += 1;
        if self.example.is_none() {
            self.example = Some(path.describe());
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Seeds attempted: {}", self.seeds_attempted)?;
        writeln!(f, "Paths accepted:  {}", self.paths_accepted)?;
        writeln!(f, "  too short:     {}", self.too_short)?;
        writeln!(f, "  seed missing:  {}", self.seeds_missing)?;
        writeln!(f, "  failed walks:  {}", self.failures)?;
        if !self.length_distribution.is_empty() {
            writeln!(f, "Path length distribution:")?;
            for (length, count) in &self.length_distribution {
                let share = *count as f64 / self.paths_accepted.max(1) as f64 * 100.0;
                writeln!(f, "  length {length}: {count} ({share:.1}%)")?;
            }
        }
        if let Some(example) = &self.example {
            writeln!(f, "Example path:")?;
            for line in example.lines() {
                writeln!(f, "  {line}")?;
            }
        }
        Ok(())
    }
}

/// What happened to one seed.
enum SeedResult {
    Done(WalkOutcome),
    Failed {
        seed_id: String,
        message: String,
        partial: Option<EvidencePath>,
    },
}

/// Walks a seed list and writes accepted paths.
pub struct BatchWalker<'c> {
    walk: &'c WalkConfig,
    batch: &'c BatchConfig,
}

impl<'c> BatchWalker<'c> {
    pub fn new(walk: &'c WalkConfig, batch: &'c BatchConfig) -> Self {
        Self { walk, batch }
    }

    fn rng_for(&self, position: usize) -> StdRng {
        match self.batch.rng_seed {
            Some(base) => StdRng::seed_from_u64(base.wrapping_add(position as u64)),
            None => StdRng::from_entropy(),
        }
    }

    /// Walk every seed and append accepted paths to `writer` in seed order.
    pub fn run<S: GatewaySource>(
        &self,
        source: &S,
        seeds: &[String],
        writer: &mut JsonlWriter,
    ) -> RarepathResult<RunSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.batch.workers)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "batch.workers".into(),
                message: e.to_string(),
            })?;

        tracing::info!(
            seeds = seeds.len(),
            workers = self.batch.workers,
            min_path_length = self.walk.min_path_length,
            max_path_length = self.walk.max_path_length,
            "walking seeds"
        );

        let done = AtomicUsize::new(0);
        let results: Vec<SeedResult> = pool.install(|| {
            seeds
                .par_iter()
                .enumerate()
                .map_init(
                    || source.open_session(),
                    |session, (position, seed_id)| {
                        let result = match session {
                            Ok(gateway) => self.walk_one(&*gateway, position, seed_id),
                            Err(e) => SeedResult::Failed {
                                seed_id: seed_id.clone(),
                                message: format!("could not open graph session: {e}"),
                                partial: None,
                            },
                        };
                        self.report_progress(done.fetch_add(1, Ordering::Relaxed) + 1, seeds.len());
                        result
                    },
                )
                .collect()
        });

        let mut summary = RunSummary {
            seeds_attempted: seeds.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                SeedResult::Done(WalkOutcome::Accepted(path)) => {
                    writer.write(&PathRecord::from(&path))?;
                    summary.accept(&path);
                }
                SeedResult::Done(WalkOutcome::TooShort { .. }) => summary.too_short += 1,
                SeedResult::Done(WalkOutcome::SeedMissing) => summary.seeds_missing += 1,
                SeedResult::Failed {
                    seed_id,
                    message,
                    partial,
                } => {
                    tracing::warn!(seed_id = %seed_id, error = %message, "walk failed, continuing");
                    summary.failures += 1;
                    if let Some(path) = partial {
                        writer.write(&PathRecord::from(&path))?;
                        summary.accept(&path);
                    }
                }
            }
        }

        tracing::info!(
            attempted = summary.seeds_attempted,
            accepted = summary.paths_accepted,
            failures = summary.failures,
            "walk batch complete"
        );
        Ok(summary)
    }

    fn walk_one<G: GraphGateway>(&self, gateway: &G, position: usize, seed_id: &str) -> SeedResult {
        let mut rng = self.rng_for(position);
        match BackwardWalker::new(gateway, self.walk).walk(seed_id, &mut rng) {
            Ok(outcome) => SeedResult::Done(outcome),
            Err(err) => {
                let message = match &err {
                    WalkError::Gateway { source, .. } => source.to_string(),
                };
                SeedResult::Failed {
                    seed_id: err.seed_id().to_string(),
                    message,
                    partial: err.into_partial(),
                }
            }
        }
    }

    fn report_progress(&self, done: usize, total: usize) {
        let every = self.batch.progress_every;
        if every > 0 && done % every == 0 {
            tracing::info!(done, total, "walk progress");
        }
    }
}
