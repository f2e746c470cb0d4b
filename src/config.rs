//! Pipeline configuration.
//!
//! All thresholds and weights live in one immutable [`PipelineConfig`] value that
//! is loaded once (TOML file, then CLI overrides), validated, and handed by
//! reference to the scorer, walker and batch driver.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Complete configuration for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scoring: ScoringConfig,
    pub walk: WalkConfig,
    pub batch: BatchConfig,
    pub graph: GraphSource,
    pub llm: LlmConfig,
}

impl PipelineConfig {
    /// Load from a TOML file. Missing tables and keys fall back to defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse from TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Check every range constraint. Call after applying CLI overrides.
    pub fn validate(&self) -> ConfigResult<()> {
        self.scoring.validate()?;
        self.walk.validate()?;
        self.batch.validate()?;
        self.llm.validate()
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Rare-node scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Nodes with `in + out` degree below this are not scored.
    pub min_degree: usize,
    /// Fraction of the ranking kept as seeds, in (0, 1].
    pub top_percent: f64,
    /// Property whose non-empty string value earns the definition bonus.
    pub definition_property: String,
    /// Property whose non-empty string value earns the function bonus.
    pub function_property: String,
    /// Main label → score multiplier. Unlisted labels weigh 1.0.
    pub node_type_weights: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let node_type_weights = [
            ("Law", 1.5),
            ("LegalArticle", 1.5),
            ("Crime", 1.5),
            ("LegalConcept", 1.5),
            ("Person", 1.0),
            ("Organization", 1.0),
            ("Penalty", 1.5),
            ("Location", 1.0),
        ]
        .into_iter()
        .map(|(label, w)| (label.to_string(), w))
        .collect();

        Self {
            min_degree: 1,
            top_percent: 0.8,
            definition_property: "detailed_definition".into(),
            function_property: "function".into(),
            node_type_weights,
        }
    }
}

impl ScoringConfig {
    /// Multiplier for a main label.
    pub fn type_weight(&self, label: &str) -> f64 {
        self.node_type_weights.get(label).copied().unwrap_or(1.0)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !(self.top_percent > 0.0 && self.top_percent <= 1.0) {
            return Err(invalid(
                "scoring.top_percent",
                format!("must be in (0, 1], got {}", self.top_percent),
            ));
        }
        for (label, w) in &self.node_type_weights {
            if !w.is_finite() || *w <= 0.0 {
                return Err(invalid(
                    &format!("scoring.node_type_weights.{label}"),
                    format!("must be a positive finite number, got {w}"),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// Backward walk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Paths with fewer nodes are discarded.
    pub min_path_length: usize,
    /// Hard cap on nodes per path.
    pub max_path_length: usize,
    /// Extra selection weight (λ) for predecessors from an unvisited document.
    ///
    /// Defaults to 0.0, which leaves the cross-document preference inert.
    pub diversity_bonus: f64,
    /// Node property holding the provenance document id.
    pub document_property: String,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            min_path_length: 3,
            max_path_length: 6,
            diversity_bonus: 0.0,
            document_property: "document_id".into(),
        }
    }
}

impl WalkConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.min_path_length < 1 {
            return Err(invalid("walk.min_path_length", "must be at least 1"));
        }
        if self.max_path_length < self.min_path_length {
            return Err(invalid(
                "walk.max_path_length",
                format!(
                    "must be >= min_path_length ({}), got {}",
                    self.min_path_length, self.max_path_length
                ),
            ));
        }
        if !self.diversity_bonus.is_finite() || self.diversity_bonus < 0.0 {
            return Err(invalid(
                "walk.diversity_bonus",
                format!("must be a finite number >= 0, got {}", self.diversity_bonus),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Batch driver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads walking seeds concurrently. Each opens its own session.
    pub workers: usize,
    /// Base seed for reproducible walks. `None` draws from OS entropy.
    pub rng_seed: Option<u64>,
    /// Log progress every this many seeds (0 disables).
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            rng_seed: None,
            progress_every: 50,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.workers == 0 {
            return Err(invalid("batch.workers", "must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Graph source
// ---------------------------------------------------------------------------

/// Where the graph query gateway reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GraphSource {
    /// A JSON snapshot loaded into memory.
    Snapshot { path: PathBuf },
    /// A live Neo4j server over its HTTP API.
    Neo4j(Neo4jConfig),
}

impl Default for GraphSource {
    fn default() -> Self {
        GraphSource::Neo4j(Neo4jConfig::default())
    }
}

/// Neo4j HTTP connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// Base HTTP URI, e.g. `http://localhost:7474`.
    pub uri: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".into(),
            database: "neo4j".into(),
            user: "neo4j".into(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat endpoint used for question and answer synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL including the version prefix, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub question_temperature: f64,
    pub answer_temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Requests in flight at once.
    pub max_concurrent: usize,
    /// Subject area named in the prompts.
    pub domain: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".into(),
            // vLLM ignores the key but the header must be non-empty.
            api_key: "EMPTY".into(),
            model: "default".into(),
            question_temperature: 0.3,
            answer_temperature: 0.1,
            max_tokens: 4096,
            timeout_secs: 300,
            max_concurrent: 16,
            domain: "law".into(),
        }
    }
}

impl LlmConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent == 0 {
            return Err(invalid("llm.max_concurrent", "must be at least 1"));
        }
        Ok(())
    }
}
