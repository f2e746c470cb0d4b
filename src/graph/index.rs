//! In-memory graph gateway backed by petgraph.
//!
//! A [`SnapshotGraph`] is built once (from a JSON snapshot file or
//! programmatically) and is read-only afterwards, so any number of walks may
//! query it concurrently through shared references.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

use super::{
    AggregateSpec, DegreeRecord, GatewaySource, GraphGateway, GraphNode, GraphResult, PathEdge,
    PredecessorCandidate,
};

/// On-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<PathEdge>,
}

/// Immutable in-memory property graph.
///
/// Nodes carry their full [`GraphNode`] record; edges carry the relation type.
pub struct SnapshotGraph {
    graph: DiGraph<GraphNode, String>,
    /// element_id → NodeIndex for O(1) lookups.
    node_index: HashMap<String, NodeIndex>,
}

impl SnapshotGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
        }
    }

    /// Build from a parsed snapshot.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.insert_node(node)?;
        }
        for edge in &snapshot.relationships {
            graph.insert_relationship(edge)?;
        }
        Ok(graph)
    }

    /// Load a JSON snapshot file.
    pub fn load(path: &Path) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::SnapshotRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let snapshot: GraphSnapshot =
            serde_json::from_str(&content).map_err(|e| GraphError::SnapshotParse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let graph = Self::from_snapshot(snapshot)?;
        tracing::info!(
            path = %path.display(),
            nodes = graph.node_count(),
            relationships = graph.relationship_count(),
            "loaded graph snapshot"
        );
        Ok(graph)
    }

    /// Add a node. Element ids must be unique.
    pub fn insert_node(&mut self, node: GraphNode) -> GraphResult<()> {
        if self.node_index.contains_key(&node.element_id) {
            return Err(GraphError::DuplicateNode {
                element_id: node.element_id,
            });
        }
        let id = node.element_id.clone();
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        Ok(())
    }

    /// Add a directed relationship between two existing nodes.
    pub fn insert_relationship(&mut self, edge: &PathEdge) -> GraphResult<()> {
        let src = self.index_of(&edge.source_id, &edge.relation_type)?;
        let dst = self.index_of(&edge.target_id, &edge.relation_type)?;
        self.graph.add_edge(src, dst, edge.relation_type.clone());
        Ok(())
    }

    fn index_of(&self, element_id: &str, relation_type: &str) -> GraphResult<NodeIndex> {
        self.node_index
            .get(element_id)
            .copied()
            .ok_or_else(|| GraphError::DanglingRelationship {
                relation_type: relation_type.to_string(),
                missing_id: element_id.to_string(),
            })
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of relationships.
    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for SnapshotGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotGraph")
            .field("nodes", &self.node_count())
            .field("relationships", &self.relationship_count())
            .finish()
    }
}

impl GraphGateway for SnapshotGraph {
    fn fetch_node(&self, element_id: &str) -> GraphResult<Option<GraphNode>> {
        Ok(self
            .node_index
            .get(element_id)
            .and_then(|&idx| self.graph.node_weight(idx))
            .cloned())
    }

    fn fetch_predecessors(
        &self,
        element_id: &str,
        excluded: &HashSet<String>,
        document_property: &str,
    ) -> GraphResult<Vec<PredecessorCandidate>> {
        let Some(&idx) = self.node_index.get(element_id) else {
            return Ok(vec![]);
        };

        Ok(self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter_map(|e| {
                let prev = self.graph.node_weight(e.source())?;
                if excluded.contains(&prev.element_id) {
                    return None;
                }
                Some(PredecessorCandidate {
                    predecessor_id: prev.element_id.clone(),
                    document_id: prev.document_id(document_property),
                    relation_type: e.weight().clone(),
                })
            })
            .collect())
    }

    fn aggregate_degrees(&self, spec: &AggregateSpec) -> GraphResult<Vec<DegreeRecord>> {
        Ok(self
            .graph
            .node_indices()
            .filter_map(|idx| {
                let node = self.graph.node_weight(idx)?;
                let name = node.name()?.to_string();
                let flag = |prop: &str| {
                    node.properties
                        .get(prop)
                        .is_some_and(|v| v.is_non_empty_string())
                };
                Some(DegreeRecord {
                    element_id: node.element_id.clone(),
                    name,
                    labels: node.labels.clone(),
                    in_degree: self.graph.edges_directed(idx, Direction::Incoming).count(),
                    out_degree: self.graph.edges_directed(idx, Direction::Outgoing).count(),
                    has_definition: flag(&spec.definition_property),
                    has_function: flag(&spec.function_property),
                })
            })
            .collect())
    }
}

impl<'a> GatewaySource for &'a SnapshotGraph {
    type Session = &'a SnapshotGraph;

    fn open_session(&self) -> GraphResult<Self::Session> {
        Ok(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(rel: &str, src: &str, dst: &str) -> PathEdge {
        PathEdge {
            relation_type: rel.into(),
            source_id: src.into(),
            target_id: dst.into(),
        }
    }

    fn build_fan_in() -> SnapshotGraph {
        // a --CITES--> c <--CITES-- b, c --DEFINES--> d
        let mut g = SnapshotGraph::new();
        g.insert_node(GraphNode::new("a").with_label("Law").with_property("name", "A").with_property("document_id", "D1"))
            .unwrap();
        g.insert_node(GraphNode::new("b").with_label("Law").with_property("name", "B"))
            .unwrap();
        g.insert_node(
            GraphNode::new("c")
                .with_label("Crime")
                .with_property("name", "C")
                .with_property("detailed_definition", "taking property")
                .with_property("function", ""),
        )
        .unwrap();
        g.insert_node(GraphNode::new("d").with_label("Penalty")).unwrap();
        g.insert_relationship(&edge("CITES", "a", "c")).unwrap();
        g.insert_relationship(&edge("CITES", "b", "c")).unwrap();
        g.insert_relationship(&edge("DEFINES", "c", "d")).unwrap();
        g
    }

    #[test]
    fn predecessors_respect_exclusion() {
        let g = build_fan_in();
        let none = HashSet::new();
        let mut preds = g.fetch_predecessors("c", &none, "document_id").unwrap();
        preds.sort_by(|x, y| x.predecessor_id.cmp(&y.predecessor_id));
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].predecessor_id, "a");
        assert_eq!(preds[0].document_id.as_deref(), Some("D1"));
        assert_eq!(preds[0].relation_type, "CITES");
        assert_eq!(preds[1].document_id, None);

        let excluded: HashSet<String> = ["a".to_string()].into_iter().collect();
        let preds = g.fetch_predecessors("c", &excluded, "document_id").unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].predecessor_id, "b");
    }

    #[test]
    fn unknown_node_has_no_predecessors() {
        let g = build_fan_in();
        assert!(g.fetch_predecessors("zz", &HashSet::new(), "document_id").unwrap().is_empty());
        assert_eq!(g.fetch_node("zz").unwrap(), None);
    }

    #[test]
    fn aggregate_counts_degrees_of_named_nodes() {
        let g = build_fan_in();
        let records = g.aggregate_degrees(&AggregateSpec::default()).unwrap();
        // d has no name and is skipped.
        assert_eq!(records.len(), 3);

        let c = records.iter().find(|r| r.element_id == "c").unwrap();
        assert_eq!(c.in_degree, 2);
        assert_eq!(c.out_degree, 1);
        assert!(c.has_definition);
        assert!(!c.has_function, "empty function is not documentation");

        let a = records.iter().find(|r| r.element_id == "a").unwrap();
        assert_eq!((a.in_degree, a.out_degree), (0, 1));
    }

    #[test]
    fn non_string_documentation_is_not_counted() {
        let mut g = SnapshotGraph::new();
        g.insert_node(
            GraphNode::new("x")
                .with_label("Crime")
                .with_property("name", "X")
                .with_property("detailed_definition", serde_json::json!(42))
                .with_property("function", serde_json::json!(["deters"])),
        )
        .unwrap();
        let records = g.aggregate_degrees(&AggregateSpec::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].has_definition);
        assert!(!records[0].has_function);
    }

    #[test]
    fn rejects_duplicates_and_dangling_edges() {
        let mut g = SnapshotGraph::new();
        g.insert_node(GraphNode::new("a")).unwrap();
        assert!(matches!(
            g.insert_node(GraphNode::new("a")),
            Err(GraphError::DuplicateNode { .. })
        ));
        let err = g.insert_relationship(&edge("R", "a", "ghost")).unwrap_err();
        assert!(matches!(err, GraphError::DanglingRelationship { ref missing_id, .. } if missing_id == "ghost"));
    }

    #[test]
    fn load_snapshot_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{
                "nodes": [
                    {"element_id": "4:x:1", "labels": ["Crime"], "properties": {"name": "Fraud"}},
                    {"element_id": "4:x:2", "labels": ["Law"], "properties": {"name": "Penal Code", "articles": [1, 2]}}
                ],
                "relationships": [
                    {"type": "PROHIBITS", "source_id": "4:x:2", "target_id": "4:x:1"}
                ]
            }"#,
        )
        .unwrap();

        let g = SnapshotGraph::load(&path).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.relationship_count(), 1);
        let fraud = g.fetch_node("4:x:1").unwrap().unwrap();
        assert_eq!(fraud.name(), Some("Fraud"));
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SnapshotGraph::load(&path),
            Err(GraphError::SnapshotParse { .. })
        ));
        assert!(matches!(
            SnapshotGraph::load(&dir.path().join("missing.json")),
            Err(GraphError::SnapshotRead { .. })
        ));
    }
}
