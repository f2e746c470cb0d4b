//! Graph data model and the query gateway seam.
//!
//! The rest of the crate never talks to a graph store directly. It goes through
//! [`GraphGateway`], which exposes the three queries the scorer and walker need:
//!
//! - [`GraphGateway::fetch_node`]: one node by element id, `None` if it no longer resolves
//! - [`GraphGateway::fetch_predecessors`]: incoming-edge sources outside an exclusion set
//! - [`GraphGateway::aggregate_degrees`]: degree and documentation flags for every named node
//!
//! Two gateways ship with the crate: an in-memory petgraph index loaded from a
//! JSON snapshot ([`index::SnapshotGraph`]) and a Neo4j HTTP client
//! ([`neo4j::Neo4jGateway`]).

pub mod index;
pub mod neo4j;
pub mod rarity;
pub mod walk;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Result type for gateway operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

/// A node attribute value.
///
/// The set of shapes is closed: anything richer (maps, arrays of maps) is
/// flattened to its JSON text when it enters the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "serde_json::Value")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// True for a string with at least one character.
    pub fn is_non_empty_string(&self) -> bool {
        self.as_str().is_some_and(|s| !s.is_empty())
    }

    /// Key used for document-diversity bookkeeping.
    ///
    /// Strings and numbers both occur as document ids in practice; null, empty
    /// strings and other shapes count as "no document".
    pub fn document_key(&self) -> Option<String> {
        match self {
            PropertyValue::String(s) if !s.is_empty() => Some(s.clone()),
            PropertyValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => PropertyValue::Number(n),
            Value::String(s) => PropertyValue::String(s),
            Value::Array(items) => {
                if items.iter().all(|v| !v.is_object()) {
                    PropertyValue::List(items.into_iter().map(PropertyValue::from).collect())
                } else {
                    PropertyValue::String(Value::Array(items).to_string())
                }
            }
            obj @ Value::Object(_) => PropertyValue::String(obj.to_string()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

/// Attribute bag of a node, ordered by key for stable output.
pub type Properties = BTreeMap<String, PropertyValue>;

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// Read-only snapshot of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable opaque identifier (Neo4j `elementId`).
    pub element_id: String,
    /// Type tags. The first one is the main label.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphNode {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self {
            element_id: element_id.into(),
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// First label, or `"Unknown"` for an unlabeled node.
    pub fn main_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("Unknown")
    }

    /// The `name` property when it is a string.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(PropertyValue::as_str)
    }

    /// Document key stored under `property`, if any.
    pub fn document_id(&self, property: &str) -> Option<String> {
        self.properties.get(property).and_then(PropertyValue::document_key)
    }
}

/// A directed relationship, always in stored graph direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEdge {
    #[serde(rename = "type")]
    pub relation_type: String,
    pub source_id: String,
    pub target_id: String,
}

/// One incoming edge of the node being walked from.
#[derive(Debug, Clone, PartialEq)]
pub struct PredecessorCandidate {
    pub predecessor_id: String,
    pub document_id: Option<String>,
    pub relation_type: String,
}

/// Degree aggregate for one named node, the scorer's input row.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeRecord {
    pub element_id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub in_degree: usize,
    pub out_degree: usize,
    pub has_definition: bool,
    pub has_function: bool,
}

/// Which properties the gateway inspects when aggregating.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub definition_property: String,
    pub function_property: String,
}

impl Default for AggregateSpec {
    fn default() -> Self {
        Self {
            definition_property: "detailed_definition".into(),
            function_property: "function".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway traits
// ---------------------------------------------------------------------------

/// Query interface over a property graph store.
///
/// A gateway value is one session: a walk owns its session for its lifetime and
/// sessions are not shared between concurrently running walks.
pub trait GraphGateway {
    /// Fetch a node with all its labels and properties.
    ///
    /// `Ok(None)` means the id does not resolve; `Err` means the store failed.
    fn fetch_node(&self, element_id: &str) -> GraphResult<Option<GraphNode>>;

    /// All direct incoming-edge sources of `element_id` whose id is not in
    /// `excluded`. `document_property` names the provenance attribute to report.
    fn fetch_predecessors(
        &self,
        element_id: &str,
        excluded: &HashSet<String>,
        document_property: &str,
    ) -> GraphResult<Vec<PredecessorCandidate>>;

    /// Degree counts and documentation flags for every node with a name.
    fn aggregate_degrees(&self, spec: &AggregateSpec) -> GraphResult<Vec<DegreeRecord>>;
}

impl<G: GraphGateway + ?Sized> GraphGateway for &G {
    fn fetch_node(&self, element_id: &str) -> GraphResult<Option<GraphNode>> {
        (**self).fetch_node(element_id)
    }

    fn fetch_predecessors(
        &self,
        element_id: &str,
        excluded: &HashSet<String>,
        document_property: &str,
    ) -> GraphResult<Vec<PredecessorCandidate>> {
        (**self).fetch_predecessors(element_id, excluded, document_property)
    }

    fn aggregate_degrees(&self, spec: &AggregateSpec) -> GraphResult<Vec<DegreeRecord>> {
        (**self).aggregate_degrees(spec)
    }
}

impl<G: GraphGateway + ?Sized> GraphGateway for Arc<G> {
    fn fetch_node(&self, element_id: &str) -> GraphResult<Option<GraphNode>> {
        (**self).fetch_node(element_id)
    }

    fn fetch_predecessors(
        &self,
        element_id: &str,
        excluded: &HashSet<String>,
        document_property: &str,
    ) -> GraphResult<Vec<PredecessorCandidate>> {
        (**self).fetch_predecessors(element_id, excluded, document_property)
    }

    fn aggregate_degrees(&self, spec: &AggregateSpec) -> GraphResult<Vec<DegreeRecord>> {
        (**self).aggregate_degrees(spec)
    }
}

/// Something that can open independent gateway sessions, one per worker.
pub trait GatewaySource: Sync {
    type Session: GraphGateway;

    fn open_session(&self) -> GraphResult<Self::Session>;
}
