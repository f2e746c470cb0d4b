//! Weighted backward walks from rare nodes.
//!
//! A walk starts at a seed (rare) node and repeatedly steps to a randomly chosen,
//! not yet visited predecessor, i.e. it follows edges against their stored
//! direction. Every node discovered this way is prepended, so the finished path
//! reads upstream-first and always ends at the seed:
//!
//! ```text
//! B --[r2]--> A --[r1]--> S      (walked S, then A, then B)
//! ```
//!
//! Candidates are drawn with weight `1.0 + λ` when their document has not been
//! visited yet and `1.0` otherwise. With the default `λ = 0` the draw is uniform.

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::config::WalkConfig;
use crate::error::{GraphError, WalkError};

use super::{GraphGateway, GraphNode, PathEdge, PredecessorCandidate};

/// Why a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No unvisited predecessor was left.
    Exhausted,
    /// The path reached `max_path_length` nodes.
    BudgetReached,
    /// The gateway failed; the path is what was collected before the failure.
    Aborted,
}

/// An ordered chain of nodes ending at a rare node.
///
/// `nodes()[i]` and `nodes()[i + 1]` are joined by `edges()[i]`, which points
/// from `nodes()[i]` to `nodes()[i + 1]` in stored graph direction. Only the
/// walker builds paths, and every path holds at least its seed.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidencePath {
    nodes: Vec<GraphNode>,
    edges: Vec<PathEdge>,
    termination: Termination,
    rare_node: GraphNode,
}

impl EvidencePath {
    /// Upstream-first node chain.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Relations between consecutive nodes.
    pub fn edges(&self) -> &[PathEdge] {
        &self.edges
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// The seed the walk started from (always the last node).
    pub fn rare_node(&self) -> &GraphNode {
        &self.rare_node
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Human-readable rendering: `name → name → name` and the relation chain.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self
            .nodes
            .iter()
            .map(|n| n.name().unwrap_or("N/A"))
            .collect();
        let relations: Vec<String> = self
            .edges
            .iter()
            .map(|e| format!("[{}]", e.relation_type))
            .collect();
        format!("{}\n{}-->", names.join(" → "), relations.join(" --"))
    }
}

/// Result of walking from one seed.
#[derive(Debug, Clone, PartialEq)]
pub enum WalkOutcome {
    /// A path of acceptable length.
    Accepted(EvidencePath),
    /// The walk ended below `min_path_length`; nothing is emitted.
    TooShort { node_count: usize },
    /// The seed id did not resolve, so the walk never started.
    SeedMissing,
}

impl WalkOutcome {
    pub fn into_path(self) -> Option<EvidencePath> {
        match self {
            WalkOutcome::Accepted(path) => Some(path),
            _ => None,
        }
    }
}

/// Selection weight of one candidate given the documents visited so far.
pub fn selection_weight(
    candidate: &PredecessorCandidate,
    visited_documents: &HashSet<String>,
    diversity_bonus: f64,
) -> f64 {
    match &candidate.document_id {
        Some(doc) if !visited_documents.contains(doc) => 1.0 + diversity_bonus,
        _ => 1.0,
    }
}

/// Mutable state of one walk. Owned exclusively by that walk.
struct WalkState {
    seed: GraphNode,
    current_id: String,
    /// Ids that may not be drawn again: every path node plus candidates that
    /// failed to resolve.
    excluded: HashSet<String>,
    visited_documents: HashSet<String>,
    nodes: VecDeque<GraphNode>,
    edges: VecDeque<PathEdge>,
    steps_taken: usize,
}

impl WalkState {
    fn new(seed: GraphNode, document_property: &str) -> Self {
        let mut visited_documents = HashSet::new();
        if let Some(doc) = seed.document_id(document_property) {
            visited_documents.insert(doc);
        }
        let current_id = seed.element_id.clone();
        Self {
            seed: seed.clone(),
            excluded: HashSet::from([current_id.clone()]),
            current_id,
            visited_documents,
            nodes: VecDeque::from([seed]),
            edges: VecDeque::new(),
            steps_taken: 0,
        }
    }

    fn advance(&mut self, candidate: &PredecessorCandidate, node: GraphNode) {
        self.edges.push_front(PathEdge {
            relation_type: candidate.relation_type.clone(),
            source_id: candidate.predecessor_id.clone(),
            target_id: self.current_id.clone(),
        });
        self.nodes.push_front(node);
        self.excluded.insert(candidate.predecessor_id.clone());
        if let Some(doc) = &candidate.document_id {
            self.visited_documents.insert(doc.clone());
        }
        self.current_id = candidate.predecessor_id.clone();
        self.steps_taken += 1;
    }

    fn into_path(self, termination: Termination) -> EvidencePath {
        EvidencePath {
            nodes: self.nodes.into(),
            edges: self.edges.into(),
            termination,
            rare_node: self.seed,
        }
    }
}

enum Step {
    Advanced,
    Exhausted,
}

/// Performs weighted backward walks over one gateway session.
pub struct BackwardWalker<'c, G> {
    gateway: G,
    config: &'c WalkConfig,
}

impl<'c, G: GraphGateway> BackwardWalker<'c, G> {
    pub fn new(gateway: G, config: &'c WalkConfig) -> Self {
        Self { gateway, config }
    }

    /// Walk backward from `seed_id`.
    ///
    /// Returns `Ok` for every normal ending, including paths that are too short.
    /// A gateway failure aborts the walk with [`WalkError::Gateway`], carrying
    /// the partial path when it already meets `min_path_length`.
    pub fn walk<R: Rng + ?Sized>(
        &self,
        seed_id: &str,
        rng: &mut R,
    ) -> Result<WalkOutcome, WalkError> {
        let seed = match self.gateway.fetch_node(seed_id) {
            Ok(Some(node)) => node,
            Ok(None) => {
                tracing::debug!(seed_id, "seed node does not resolve");
                return Ok(WalkOutcome::SeedMissing);
            }
            Err(source) => {
                return Err(WalkError::Gateway {
                    seed_id: seed_id.to_string(),
                    source,
                    partial: None,
                });
            }
        };

        let mut state = WalkState::new(seed, &self.config.document_property);
        let budget = self.config.max_path_length.saturating_sub(1);

        let termination = loop {
            if state.steps_taken >= budget {
                break Termination::BudgetReached;
            }
            match self.step(&mut state, rng) {
                Ok(Step::Advanced) => {}
                Ok(Step::Exhausted) => break Termination::Exhausted,
                Err(source) => return Err(self.abort(seed_id, state, source)),
            }
        };

        Ok(self.finish(seed_id, state, termination))
    }

    /// One transition: draw a predecessor and extend the path with it.
    ///
    /// A drawn candidate whose node record has vanished is excluded for the
    /// rest of the walk and the draw is repeated from the remaining
    /// candidates. Redraws do not count as steps. Each redraw shrinks the
    /// candidate set, so the loop ends with a resolved node or `Exhausted`.
    fn step<R: Rng + ?Sized>(&self, state: &mut WalkState, rng: &mut R) -> Result<Step, GraphError> {
        loop {
            let candidates = self.gateway.fetch_predecessors(
                &state.current_id,
                &state.excluded,
                &self.config.document_property,
            )?;
            if candidates.is_empty() {
                return Ok(Step::Exhausted);
            }

            let chosen = &candidates[self.draw(&candidates, &state.visited_documents, rng)];
            match self.gateway.fetch_node(&chosen.predecessor_id)? {
                Some(node) => {
                    state.advance(chosen, node);
                    return Ok(Step::Advanced);
                }
                None => {
                    tracing::debug!(
                        candidate = %chosen.predecessor_id,
                        current = %state.current_id,
                        "predecessor vanished, redrawing"
                    );
                    state.excluded.insert(chosen.predecessor_id.clone());
                }
            }
        }
    }

    fn draw<R: Rng + ?Sized>(
        &self,
        candidates: &[PredecessorCandidate],
        visited_documents: &HashSet<String>,
        rng: &mut R,
    ) -> usize {
        let weights: Vec<f64> = candidates
            .iter()
            .map(|c| selection_weight(c, visited_documents, self.config.diversity_bonus))
            .collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // Only reachable with a non-finite bonus; fall back to uniform.
            Err(_) => rng.gen_range(0..candidates.len()),
        }
    }

    fn finish(&self, seed_id: &str, state: WalkState, termination: Termination) -> WalkOutcome {
        let node_count = state.nodes.len();
        if node_count < self.config.min_path_length {
            tracing::debug!(seed_id, node_count, ?termination, "path too short, discarded");
            return WalkOutcome::TooShort { node_count };
        }
        tracing::debug!(seed_id, node_count, ?termination, "path accepted");
        WalkOutcome::Accepted(state.into_path(termination))
    }

    fn abort(&self, seed_id: &str, state: WalkState, source: GraphError) -> WalkError {
        let partial = (state.nodes.len() >= self.config.min_path_length)
            .then(|| Box::new(state.into_path(Termination::Aborted)));
        WalkError::Gateway {
            seed_id: seed_id.to_string(),
            source,
            partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::graph::index::SnapshotGraph;
    use crate::graph::{AggregateSpec, DegreeRecord, GraphResult};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn node(id: &str, label: &str, doc: Option<&str>) -> GraphNode {
        let mut n = GraphNode::new(id).with_label(label).with_property("name", id.to_uppercase().as_str());
        if let Some(doc) = doc {
            n = n.with_property("document_id", doc);
        }
        n
    }

    fn edge(rel: &str, src: &str, dst: &str) -> PathEdge {
        PathEdge {
            relation_type: rel.into(),
            source_id: src.into(),
            target_id: dst.into(),
        }
    }

    /// A linear chain n0 -> n1 -> ... -> n{len-1}.
    fn chain(len: usize) -> SnapshotGraph {
        let mut g = SnapshotGraph::new();
        for i in 0..len {
            g.insert_node(node(&format!("n{i}"), "Law", None)).unwrap();
        }
        for i in 1..len {
            g.insert_relationship(&edge("NEXT", &format!("n{}", i - 1), &format!("n{i}")))
                .unwrap();
        }
        g
    }

    fn ids(path: &EvidencePath) -> Vec<&str> {
        path.nodes().iter().map(|n| n.element_id.as_str()).collect()
    }

    #[test]
    fn three_node_chain_is_accepted() {
        // B -> A -> S, both upstream nodes from document D1.
        let mut g = SnapshotGraph::new();
        g.insert_node(node("S", "Crime", None)).unwrap();
        g.insert_node(node("A", "LegalArticle", Some("D1"))).unwrap();
        g.insert_node(node("B", "Law", Some("D1"))).unwrap();
        g.insert_relationship(&edge("DEFINES", "A", "S")).unwrap();
        g.insert_relationship(&edge("CONTAINS", "B", "A")).unwrap();

        let config = WalkConfig::default();
        let walker = BackwardWalker::new(&g, &config);
        let path = walker.walk("S", &mut rng()).unwrap().into_path().unwrap();

        assert_eq!(ids(&path), vec!["B", "A", "S"]);
        assert_eq!(path.len(), 3);
        assert_eq!(path.edges(), vec![edge("CONTAINS", "B", "A"), edge("DEFINES", "A", "S")]);
        assert_eq!(path.rare_node().element_id, "S");
        assert_eq!(path.termination(), Termination::Exhausted);
    }

    #[test]
    fn seed_without_predecessors_yields_nothing() {
        let g = chain(1);
        let config = WalkConfig::default();
        let outcome = BackwardWalker::new(&g, &config).walk("n0", &mut rng()).unwrap();
        assert_eq!(outcome, WalkOutcome::TooShort { node_count: 1 });
    }

    #[test]
    fn short_upstream_chain_is_discarded() {
        // Only one predecessor upstream: 2 nodes < 3.
        let g = chain(2);
        let config = WalkConfig::default();
        let outcome = BackwardWalker::new(&g, &config).walk("n1", &mut rng()).unwrap();
        assert_eq!(outcome, WalkOutcome::TooShort { node_count: 2 });
    }

    #[test]
    fn stops_at_max_length_with_more_upstream() {
        let g = chain(10);
        let config = WalkConfig::default();
        let path = BackwardWalker::new(&g, &config)
            .walk("n9", &mut rng())
            .unwrap()
            .into_path()
            .unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(ids(&path), vec!["n4", "n5", "n6", "n7", "n8", "n9"]);
        assert_eq!(path.edges().len(), 5);
        assert_eq!(path.termination(), Termination::BudgetReached);
    }

    #[test]
    fn exact_budget_chain() {
        // Exactly max_path_length - 1 hops available.
        let g = chain(6);
        let config = WalkConfig::default();
        let path = BackwardWalker::new(&g, &config)
            .walk("n5", &mut rng())
            .unwrap()
            .into_path()
            .unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path.termination(), Termination::BudgetReached);
    }

    #[test]
    fn cycles_are_not_revisited() {
        // a -> b -> c -> a, c is the seed.
        let mut g = SnapshotGraph::new();
        for id in ["a", "b", "c"] {
            g.insert_node(node(id, "Law", None)).unwrap();
        }
        g.insert_relationship(&edge("R", "a", "b")).unwrap();
        g.insert_relationship(&edge("R", "b", "c")).unwrap();
        g.insert_relationship(&edge("R", "c", "a")).unwrap();

        let config = WalkConfig::default();
        let path = BackwardWalker::new(&g, &config)
            .walk("c", &mut rng())
            .unwrap()
            .into_path()
            .unwrap();
        assert_eq!(ids(&path), vec!["a", "b", "c"]);
        assert_eq!(path.termination(), Termination::Exhausted);
    }

    #[test]
    fn unknown_seed_is_missing() {
        let g = chain(3);
        let config = WalkConfig::default();
        let outcome = BackwardWalker::new(&g, &config).walk("nope", &mut rng()).unwrap();
        assert_eq!(outcome, WalkOutcome::SeedMissing);
    }

    #[test]
    fn diversity_bonus_weights() {
        let visited: HashSet<String> = ["D1".to_string()].into_iter().collect();
        let cand = |doc: Option<&str>| PredecessorCandidate {
            predecessor_id: "x".into(),
            document_id: doc.map(str::to_string),
            relation_type: "R".into(),
        };
        assert_eq!(selection_weight(&cand(Some("D2")), &visited, 0.5), 1.5);
        assert_eq!(selection_weight(&cand(Some("D1")), &visited, 0.5), 1.0);
        assert_eq!(selection_weight(&cand(None), &visited, 0.5), 1.0);
        assert_eq!(selection_weight(&cand(Some("D2")), &visited, 0.0), 1.0);
    }

    #[test]
    fn large_bonus_prefers_new_documents() {
        // Seed S (doc D1) has predecessors same (D1) and fresh (D2).
        let mut g = SnapshotGraph::new();
        g.insert_node(node("S", "Crime", Some("D1"))).unwrap();
        g.insert_node(node("same", "Law", Some("D1"))).unwrap();
        g.insert_node(node("fresh", "Law", Some("D2"))).unwrap();
        g.insert_relationship(&edge("R", "same", "S")).unwrap();
        g.insert_relationship(&edge("R", "fresh", "S")).unwrap();

        let config = WalkConfig {
            min_path_length: 2,
            max_path_length: 2,
            diversity_bonus: 1_000.0,
            ..Default::default()
        };
        let walker = BackwardWalker::new(&g, &config);
        let mut rng = rng();
        let fresh = (0..200)
            .filter(|_| {
                let path = walker.walk("S", &mut rng).unwrap().into_path().unwrap();
                path.nodes()[0].element_id == "fresh"
            })
            .count();
        assert!(fresh > 190, "fresh picked {fresh}/200 times");
    }

    /// Gateway wrapper whose `fetch_node` forgets some ids and can start failing.
    struct Flaky<'g> {
        inner: &'g SnapshotGraph,
        vanished: HashSet<&'static str>,
        fail_after_fetches: Option<usize>,
        fetches: Cell<usize>,
    }

    impl GraphGateway for Flaky<'_> {
        fn fetch_node(&self, element_id: &str) -> GraphResult<Option<GraphNode>> {
            let n = self.fetches.get() + 1;
            self.fetches.set(n);
            if self.fail_after_fetches.is_some_and(|limit| n > limit) {
                return Err(GraphError::Unreachable {
                    endpoint: "test".into(),
                    message: "connection reset".into(),
                });
            }
            if self.vanished.contains(element_id) {
                return Ok(None);
            }
            self.inner.fetch_node(element_id)
        }

        fn fetch_predecessors(
            &self,
            element_id: &str,
            excluded: &HashSet<String>,
            document_property: &str,
        ) -> GraphResult<Vec<PredecessorCandidate>> {
            self.inner.fetch_predecessors(element_id, excluded, document_property)
        }

        fn aggregate_degrees(&self, spec: &AggregateSpec) -> GraphResult<Vec<DegreeRecord>> {
            self.inner.aggregate_degrees(spec)
        }
    }

    #[test]
    fn vanished_candidate_is_skipped_without_using_a_step() {
        // ghost -> S and a -> S; b -> a. ghost has no record.
        let mut g = SnapshotGraph::new();
        for id in ["S", "ghost", "a", "b"] {
            g.insert_node(node(id, "Law", None)).unwrap();
        }
        g.insert_relationship(&edge("R", "ghost", "S")).unwrap();
        g.insert_relationship(&edge("R", "a", "S")).unwrap();
        g.insert_relationship(&edge("R", "b", "a")).unwrap();

        let flaky = Flaky {
            inner: &g,
            vanished: HashSet::from(["ghost"]),
            fail_after_fetches: None,
            fetches: Cell::new(0),
        };
        let config = WalkConfig::default();
        let walker = BackwardWalker::new(&flaky, &config);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let path = walker.walk("S", &mut rng).unwrap().into_path().unwrap();
            assert_eq!(ids(&path), vec!["b", "a", "S"]);
        }
    }

    #[test]
    fn only_vanished_candidates_exhaust_the_walk() {
        let mut g = SnapshotGraph::new();
        for id in ["S", "g1", "g2"] {
            g.insert_node(node(id, "Law", None)).unwrap();
        }
        g.insert_relationship(&edge("R", "g1", "S")).unwrap();
        g.insert_relationship(&edge("R", "g2", "S")).unwrap();

        let flaky = Flaky {
            inner: &g,
            vanished: HashSet::from(["g1", "g2"]),
            fail_after_fetches: None,
            fetches: Cell::new(0),
        };
        let config = WalkConfig {
            min_path_length: 1,
            ..Default::default()
        };
        let path = BackwardWalker::new(&flaky, &config)
            .walk("S", &mut rng())
            .unwrap()
            .into_path()
            .unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.termination(), Termination::Exhausted);
    }

    #[test]
    fn lone_seed_path_still_has_its_rare_node() {
        let mut g = SnapshotGraph::new();
        g.insert_node(node("S", "Crime", Some("D1"))).unwrap();
        let config = WalkConfig {
            min_path_length: 1,
            ..Default::default()
        };
        let path = BackwardWalker::new(&g, &config)
            .walk("S", &mut rng())
            .unwrap()
            .into_path()
            .unwrap();
        assert!(!path.is_empty());
        assert!(path.edges().is_empty());
        assert_eq!(path.rare_node().element_id, "S");
        assert_eq!(path.nodes(), std::slice::from_ref(path.rare_node()));
    }

    #[test]
    fn live_predecessor_found_among_many_vanished() {
        // g0..g5 -> S have no node record; live -> S and up -> live do.
        let vanished = ["g0", "g1", "g2", "g3", "g4", "g5"];
        let mut g = SnapshotGraph::new();
        for id in ["S", "live", "up"].into_iter().chain(vanished) {
            g.insert_node(node(id, "Law", None)).unwrap();
        }
        for id in vanished {
            g.insert_relationship(&edge("R", id, "S")).unwrap();
        }
        g.insert_relationship(&edge("R", "live", "S")).unwrap();
        g.insert_relationship(&edge("R", "up", "live")).unwrap();

        let flaky = Flaky {
            inner: &g,
            vanished: vanished.into_iter().collect(),
            fail_after_fetches: None,
            fetches: Cell::new(0),
        };
        let config = WalkConfig::default();
        let walker = BackwardWalker::new(&flaky, &config);
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let path = walker.walk("S", &mut rng).unwrap().into_path().unwrap();
            assert_eq!(ids(&path), vec!["up", "live", "S"], "rng seed {seed}");
            assert_eq!(path.termination(), Termination::Exhausted);
        }
    }

    #[test]
    fn gateway_failure_aborts_with_partial_path() {
        let g = chain(10);
        // Seed fetch + 3 successful steps, then the store goes away.
        let flaky = Flaky {
            inner: &g,
            vanished: HashSet::new(),
            fail_after_fetches: Some(4),
            fetches: Cell::new(0),
        };
        let config = WalkConfig::default();
        let err = BackwardWalker::new(&flaky, &config)
            .walk("n9", &mut rng())
            .unwrap_err();
        assert_eq!(err.seed_id(), "n9");
        let partial = err.into_partial().unwrap();
        assert_eq!(ids(&partial), vec!["n6", "n7", "n8", "n9"]);
        assert_eq!(partial.termination(), Termination::Aborted);
    }

    #[test]
    fn gateway_failure_before_min_length_has_no_partial() {
        let g = chain(10);
        let flaky = Flaky {
            inner: &g,
            vanished: HashSet::new(),
            fail_after_fetches: Some(1),
            fetches: Cell::new(0),
        };
        let config = WalkConfig::default();
        let err = BackwardWalker::new(&flaky, &config)
            .walk("n9", &mut rng())
            .unwrap_err();
        assert!(err.into_partial().is_none());
    }

    #[test]
    fn same_rng_seed_same_path() {
        // Dense fan-in so draws matter.
        let mut g = SnapshotGraph::new();
        let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..30 {
            g.insert_node(node(&format!("v{i}"), "Law", None)).unwrap();
        }
        for i in 0..30 {
            for j in [(i + 1) % 30, (i + 7) % 30, (i + 13) % 30] {
                g.insert_relationship(&edge("R", &format!("v{i}"), &format!("v{j}"))).unwrap();
                adjacency.entry(j).or_default().push(i);
            }
        }
        assert!(adjacency.values().all(|preds| preds.len() == 3));

        let config = WalkConfig::default();
        let walker = BackwardWalker::new(&g, &config);
        let first = walker.walk("v0", &mut StdRng::seed_from_u64(7)).unwrap();
        let second = walker.walk("v0", &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn describe_renders_names_and_relations() {
        let g = chain(3);
        let config = WalkConfig::default();
        let path = BackwardWalker::new(&g, &config)
            .walk("n2", &mut rng())
            .unwrap()
            .into_path()
            .unwrap();
        assert_eq!(path.describe(), "N0 → N1 → N2\n[NEXT] --[NEXT]-->");
    }
}
