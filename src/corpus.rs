//! Line-delimited files exchanged between pipeline stages.
//!
//! - seed files: one element id per line, or the ranked-node JSONL table
//! - the path corpus: one [`PathRecord`] per accepted evidence path
//! - question and answer files written by [`crate::qa`]

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::graph::rarity::ScoredNode;
use crate::graph::walk::EvidencePath;
use crate::graph::{GraphNode, PathEdge};

/// Result type for corpus file operations.
pub type CorpusResult<T> = std::result::Result<T, CorpusError>;

/// Serialized form of an accepted evidence path.
///
/// `path_nodes[0]` is the furthest-upstream node and `path_nodes[-1]` the rare
/// node, which is repeated in `rare_node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub path_nodes: Vec<GraphNode>,
    pub path_relations: Vec<PathEdge>,
    pub rare_node: GraphNode,
    pub path_length: usize,
}

impl From<&EvidencePath> for PathRecord {
    fn from(path: &EvidencePath) -> Self {
        Self {
            path_nodes: path.nodes().to_vec(),
            path_relations: path.edges().to_vec(),
            rare_node: path.rare_node().clone(),
            path_length: path.len(),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CorpusError {
    CorpusError::Io {
        path: path.display().to_string(),
        source,
    }
}

// ---------------------------------------------------------------------------
// JSONL writing and reading
// ---------------------------------------------------------------------------

/// Buffered writer of one JSON record per line.
pub struct JsonlWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    /// Create (or truncate) `path`.
    pub fn create(path: &Path) -> CorpusResult<Self> {
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        Ok(Self::wrap(path, file))
    }

    /// Open `path` for appending, creating it if needed.
    pub fn append(path: &Path) -> CorpusResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_error(path, e))?;
        Ok(Self::wrap(path, file))
    }

    fn wrap(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        }
    }

    /// Append one record.
    pub fn write<T: Serialize>(&mut self, record: &T) -> CorpusResult<()> {
        serde_json::to_writer(&mut self.out, record).map_err(|e| CorpusError::Serialize {
            message: e.to_string(),
        })?;
        self.out
            .write_all(b"\n")
            .map_err(|e| io_error(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Flush buffered output. Returns the number of records written.
    pub fn finish(mut self) -> CorpusResult<usize> {
        self.out.flush().map_err(|e| io_error(&self.path, e))?;
        Ok(self.written)
    }
}

/// Read every non-blank line of `path` as a `T`.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> CorpusResult<Vec<T>> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_error(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| CorpusError::Parse {
            path: path.display().to_string(),
            line: i + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Seed files
// ---------------------------------------------------------------------------

/// Write the ranked-node table, one [`ScoredNode`] per line.
pub fn write_ranked(path: &Path, nodes: &[ScoredNode]) -> CorpusResult<usize> {
    let mut writer = JsonlWriter::create(path)?;
    for node in nodes {
        writer.write(node)?;
    }
    writer.finish()
}

/// Write bare seed ids, one per line.
pub fn write_seed_ids(path: &Path, nodes: &[ScoredNode]) -> CorpusResult<()> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut out = BufWriter::new(file);
    for node in nodes {
        writeln!(out, "{}", node.element_id).map_err(|e| io_error(path, e))?;
    }
    out.flush().map_err(|e| io_error(path, e))
}

/// Read seed ids in file order.
///
/// A `.jsonl` file is read as a ranked-node table; anything else as one id per
/// line. Blank lines are skipped.
pub fn read_seed_ids(path: &Path) -> CorpusResult<Vec<String>> {
    let ids: Vec<String> = if path.extension().is_some_and(|ext| ext == "jsonl") {
        read_jsonl::<ScoredNode>(path)?
            .into_iter()
            .map(|n| n.element_id)
            .collect()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    };

    if ids.is_empty() {
        return Err(CorpusError::EmptySeedFile {
            path: path.display().to_string(),
        });
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::config::WalkConfig;
    use crate::graph::index::SnapshotGraph;
    use crate::graph::walk::BackwardWalker;

    fn scored(id: &str, score: f64) -> ScoredNode {
        ScoredNode {
            element_id: id.into(),
            name: id.to_uppercase(),
            label: "Crime".into(),
            in_degree: 1,
            out_degree: 0,
            total_degree: 1,
            has_definition: false,
            has_function: false,
            score,
        }
    }

    /// Penal Code --PROHIBITS--> Theft, walked back from Theft.
    fn sample_path() -> EvidencePath {
        let mut graph = SnapshotGraph::new();
        graph
            .insert_node(GraphNode::new("B").with_label("Law").with_property("name", "Penal Code"))
            .unwrap();
        graph
            .insert_node(GraphNode::new("S").with_label("Crime").with_property("name", "Theft"))
            .unwrap();
        graph
            .insert_relationship(&PathEdge {
                relation_type: "PROHIBITS".into(),
                source_id: "B".into(),
                target_id: "S".into(),
            })
            .unwrap();

        let config = WalkConfig {
            min_path_length: 2,
            ..Default::default()
        };
        BackwardWalker::new(&graph, &config)
            .walk("S", &mut StdRng::seed_from_u64(7))
            .unwrap()
            .into_path()
            .unwrap()
    }

    #[test]
    fn path_record_shape() {
        let record = PathRecord::from(&sample_path());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["path_length"], 2);
        assert_eq!(json["path_nodes"][0]["element_id"], "B");
        assert_eq!(json["path_nodes"][1]["labels"][0], "Crime");
        assert_eq!(json["path_relations"][0]["type"], "PROHIBITS");
        assert_eq!(json["path_relations"][0]["source_id"], "B");
        assert_eq!(json["rare_node"], json["path_nodes"][1]);
        assert_eq!(json["rare_node"]["properties"]["name"], "Theft");
    }

    #[test]
    fn jsonl_write_then_append() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("paths.jsonl");
        let record = PathRecord::from(&sample_path());

        let mut writer = JsonlWriter::create(&path).unwrap();
        writer.write(&record).unwrap();
        assert_eq!(writer.finish().unwrap(), 1);

        let mut writer = JsonlWriter::append(&path).unwrap();
        writer.write(&record).unwrap();
        writer.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let back: Vec<PathRecord> = read_jsonl(&path).unwrap();
        assert_eq!(back, vec![record.clone(), record]);
    }

    #[test]
    fn read_jsonl_reports_line_numbers() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, "{\"a\": 1}\n\n{oops\n").unwrap();
        let err = read_jsonl::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, CorpusError::Parse { line: 3, .. }));
    }

    #[test]
    fn seed_ids_round_trip_both_formats() {
        let dir = tempfile::TempDir::new().unwrap();
        let nodes = vec![scored("4:x:9", 1.5), scored("4:x:2", 0.7)];

        let txt = dir.path().join("rare_node_element_ids.txt");
        write_seed_ids(&txt, &nodes).unwrap();
        assert_eq!(read_seed_ids(&txt).unwrap(), vec!["4:x:9", "4:x:2"]);

        let table = dir.path().join("rare_nodes.jsonl");
        assert_eq!(write_ranked(&table, &nodes).unwrap(), 2);
        assert_eq!(read_seed_ids(&table).unwrap(), vec!["4:x:9", "4:x:2"]);
    }

    #[test]
    fn empty_seed_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seeds.txt");
        std::fs::write(&path, "\n  \n").unwrap();
        assert!(matches!(
            read_seed_ids(&path),
            Err(CorpusError::EmptySeedFile { .. })
        ));
    }
}
