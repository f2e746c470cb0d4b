//! Rich diagnostic error types for rarepath.
//!
//! Graph access, scoring, walking, corpus files, configuration and the language
//! model each get their own enum. Variants carry a `rarepath::` diagnostic code,
//! and help text wherever the user can act on the failure.
//!
//! Several conditions that look like failures are *not* errors:
//! a node that no longer resolves (`fetch_node` returns `Ok(None)`), a step with
//! no eligible predecessors, and a walk that ends below the minimum length are
//! ordinary outcomes reported through [`crate::graph::walk::WalkOutcome`].

use miette::Diagnostic;
use thiserror::Error;

use crate::graph::walk::EvidencePath;

/// Top-level error type for rarepath.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum RarepathError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),
}

/// Convenience alias for results using the top-level error.
pub type RarepathResult<T> = std::result::Result<T, RarepathError>;

// ---------------------------------------------------------------------------
// Graph gateway errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph store unreachable at {endpoint}: {message}")]
    #[diagnostic(
        code(rarepath::graph::unreachable),
        help(
            "The graph query gateway could not be contacted. Check that Neo4j is \
             running, that the HTTP connector is enabled, and that `[graph].uri` \
             points at it."
        )
    )]
    Unreachable { endpoint: String, message: String },

    #[error("graph query rejected: {message}")]
    #[diagnostic(
        code(rarepath::graph::query),
        help("The graph store refused the statement. Check credentials and the database name.")
    )]
    Query { message: String },

    #[error("malformed graph response: {message}")]
    #[diagnostic(
        code(rarepath::graph::malformed_response),
        help(
            "The graph store answered with a shape rarepath does not understand. \
             Neo4j 5.x with the HTTP transactional endpoint is expected."
        )
    )]
    MalformedResponse { message: String },

    #[error("failed to read graph snapshot {path}: {source}")]
    #[diagnostic(
        code(rarepath::graph::snapshot_read),
        help("Check that the snapshot file exists and is readable.")
    )]
    SnapshotRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse graph snapshot {path}: {message}")]
    #[diagnostic(
        code(rarepath::graph::snapshot_parse),
        help(
            "A snapshot is a JSON object with `nodes` ({{element_id, labels, properties}}) \
             and `relationships` ({{type, source_id, target_id}}) arrays."
        )
    )]
    SnapshotParse { path: String, message: String },

    #[error("relationship {relation_type} references unknown node {missing_id}")]
    #[diagnostic(
        code(rarepath::graph::dangling_relationship),
        help("Every relationship endpoint must appear in the snapshot's `nodes` array.")
    )]
    DanglingRelationship {
        relation_type: String,
        missing_id: String,
    },

    #[error("duplicate node id {element_id}")]
    #[diagnostic(
        code(rarepath::graph::duplicate_node),
        help("Node element ids must be unique within a snapshot.")
    )]
    DuplicateNode { element_id: String },
}

// ---------------------------------------------------------------------------
// Scoring errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ScoreError {
    #[error("no node qualifies for scoring ({examined} examined, min_degree = {min_degree})")]
    #[diagnostic(
        code(rarepath::score::eligibility_exhausted),
        help(
            "No named node reaches the minimum degree, so no seeds can be produced. \
             Lower `[scoring].min_degree` or check that the graph was loaded."
        )
    )]
    EligibilityExhausted { min_degree: usize, examined: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Gateway(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Walk errors
// ---------------------------------------------------------------------------

/// A walk aborted by the gateway.
///
/// `partial` holds the path accumulated before the failure when it already
/// satisfies the minimum length.
#[derive(Debug, Error, Diagnostic)]
pub enum WalkError {
    #[error("walk from seed {seed_id} aborted: {source}")]
    #[diagnostic(
        code(rarepath::walk::gateway),
        help("The graph store failed mid-walk. The batch continues with the next seed.")
    )]
    Gateway {
        seed_id: String,
        #[source]
        source: GraphError,
        partial: Option<Box<EvidencePath>>,
    },
}

impl WalkError {
    /// Seed whose walk failed.
    pub fn seed_id(&self) -> &str {
        match self {
            WalkError::Gateway { seed_id, .. } => seed_id,
        }
    }

    /// Take the partial path, if one long enough was collected.
    pub fn into_partial(self) -> Option<EvidencePath> {
        match self {
            WalkError::Gateway { partial, .. } => partial.map(|p| *p),
        }
    }
}

// ---------------------------------------------------------------------------
// Corpus (file I/O) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(rarepath::corpus::io),
        help("Check that the directory exists, has correct permissions, and that the disk is not full.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    #[diagnostic(
        code(rarepath::corpus::parse),
        help("Each line must be one JSON record as written by the previous pipeline stage.")
    )]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(code(rarepath::corpus::serialize))]
    Serialize { message: String },

    #[error("seed file {path} contains no identifiers")]
    #[diagnostic(
        code(rarepath::corpus::empty_seeds),
        help("Run `rarepath score` first, or point `--seeds` at a non-empty file.")
    )]
    EmptySeedFile { path: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    #[diagnostic(code(rarepath::config::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(rarepath::config::parse),
        help("The config file is TOML with optional [scoring], [walk], [batch], [graph] and [llm] tables.")
    )]
    Parse { path: String, message: String },

    #[error("invalid value for {field}: {message}")]
    #[diagnostic(code(rarepath::config::invalid))]
    Invalid { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Language-model errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("chat completion request failed: {message}")]
    #[diagnostic(
        code(rarepath::llm::request_failed),
        help("Check that the OpenAI-compatible server is running at `[llm].base_url`.")
    )]
    RequestFailed { message: String },

    #[error("chat completion returned status {code}: {body}")]
    #[diagnostic(
        code(rarepath::llm::status),
        help("Check `[llm].model` and `[llm].api_key`.")
    )]
    Status { code: u16, body: String },

    #[error("failed to parse chat completion: {message}")]
    #[diagnostic(
        code(rarepath::llm::parse_error),
        help("The server returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("chat completion was empty")]
    #[diagnostic(code(rarepath::llm::empty))]
    EmptyCompletion,
}
