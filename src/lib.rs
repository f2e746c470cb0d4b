// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rarepath
//!
//! Samples multi-hop evidence paths from a legal knowledge graph, anchored on
//! its rarest and best-documented nodes, for synthetic question answering data.
//!
//! ## Architecture
//!
//! - **Graph access** (`graph`): the [`graph::GraphGateway`] trait with an
//!   in-memory petgraph backend and a Neo4j HTTP backend
//! - **Rarity scoring** (`graph::rarity`): low-degree, documented, heavily
//!   typed nodes rank first
//! - **Backward walk** (`graph::walk`): weighted random walk against edge
//!   direction, ending on the rare node
//! - **Batch driver** (`pipeline`): scores, then walks every seed in parallel
//! - **Corpus files** (`corpus`): JSONL path records and seed lists
//! - **QA synthesis** (`llm`, `qa`): questions and answers from an
//!   OpenAI-compatible model
//!
//! ## Library usage
//!
//! ```no_run
//! use rand::SeedableRng;
//! use rarepath::config::PipelineConfig;
//! use rarepath::graph::index::SnapshotGraph;
//! use rarepath::graph::walk::BackwardWalker;
//! use rarepath::pipeline::score_graph;
//!
//! let config = PipelineConfig::default();
//! let graph = SnapshotGraph::load("graph.json".as_ref()).unwrap();
//! let ranked = score_graph(&graph, &config.scoring).unwrap();
//! let seed = &ranked.select_top(config.scoring.top_percent)[0];
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let walker = BackwardWalker::new(&graph, &config.walk);
//! if let Some(path) = walker.walk(&seed.element_id, &mut rng).unwrap().into_path() {
//!     println!("{}", path.describe());
//! }
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod qa;
