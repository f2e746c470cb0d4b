//! Neo4j gateway over the HTTP transactional Cypher endpoint.
//!
//! Each query is one `POST {uri}/db/{database}/tx/commit` round trip, so a
//! session is just a configured `ureq::Agent`. Workers each open their own
//! session through [`Neo4jSource`].

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{Value, json};

use crate::config::Neo4jConfig;
use crate::error::GraphError;

use super::{
    AggregateSpec, DegreeRecord, GatewaySource, GraphGateway, GraphNode, GraphResult,
    PredecessorCandidate, Properties,
};

const FETCH_NODE: &str = "\
MATCH (n)
WHERE elementId(n) = $element_id
RETURN elementId(n) AS element_id, labels(n) AS labels, properties(n) AS properties";

const FETCH_PREDECESSORS: &str = "\
MATCH (prev)-[r]->(curr)
WHERE elementId(curr) = $current_id
  AND NOT (elementId(prev) IN $excluded)
RETURN elementId(prev) AS source_id, prev[$document_property] AS doc_id, type(r) AS rel_type";

const AGGREGATE_DEGREES: &str = "\
MATCH (n)
WHERE n.name IS NOT NULL
OPTIONAL MATCH (n)-[r_out]->()
WITH n, count(r_out) AS out_degree
OPTIONAL MATCH (n)<-[r_in]-()
WITH n, out_degree, count(r_in) AS in_degree
RETURN
    elementId(n) AS element_id,
    n.name AS name,
    labels(n) AS labels,
    in_degree,
    out_degree,
    valueType(n[$definition_property]) STARTS WITH 'STRING'
        AND n[$definition_property] <> '' AS has_def,
    valueType(n[$function_property]) STARTS WITH 'STRING'
        AND n[$function_property] <> '' AS has_func";

/// One Neo4j HTTP session.
pub struct Neo4jGateway {
    agent: ureq::Agent,
    endpoint: String,
    authorization: Option<String>,
}

impl Neo4jGateway {
    pub fn new(config: &Neo4jConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let endpoint = format!(
            "{}/db/{}/tx/commit",
            config.uri.trim_end_matches('/'),
            config.database
        );
        let authorization = (!config.user.is_empty())
            .then(|| basic_auth(&config.user, &config.password));
        Self {
            agent,
            endpoint,
            authorization,
        }
    }

    /// Run one statement and return its rows.
    fn run(&self, statement: &str, parameters: Value) -> GraphResult<Vec<Vec<Value>>> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json;charset=UTF-8");
        if let Some(auth) = &self.authorization {
            request = request.set("Authorization", auth);
        }

        let resp = match request.send_json(body) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(GraphError::Query {
                    message: format!("HTTP {code}: {text}"),
                });
            }
            Err(e) => {
                return Err(GraphError::Unreachable {
                    endpoint: self.endpoint.clone(),
                    message: e.to_string(),
                });
            }
        };

        let json: Value = resp.into_json().map_err(|e| GraphError::Unreachable {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })?;
        parse_rows(json)
    }
}

impl GraphGateway for Neo4jGateway {
    fn fetch_node(&self, element_id: &str) -> GraphResult<Option<GraphNode>> {
        let rows = self.run(FETCH_NODE, json!({ "element_id": element_id }))?;
        rows.into_iter().next().map(node_from_row).transpose()
    }

    fn fetch_predecessors(
        &self,
        element_id: &str,
        excluded: &HashSet<String>,
        document_property: &str,
    ) -> GraphResult<Vec<PredecessorCandidate>> {
        let excluded: Vec<&str> = excluded.iter().map(String::as_str).collect();
        let rows = self.run(
            FETCH_PREDECESSORS,
            json!({
                "current_id": element_id,
                "excluded": excluded,
                "document_property": document_property,
            }),
        )?;
        rows.into_iter().map(candidate_from_row).collect()
    }

    fn aggregate_degrees(&self, spec: &AggregateSpec) -> GraphResult<Vec<DegreeRecord>> {
        let rows = self.run(
            AGGREGATE_DEGREES,
            json!({
                "definition_property": spec.definition_property,
                "function_property": spec.function_property,
            }),
        )?;
        rows.into_iter().filter_map(degree_from_row).collect()
    }
}

/// Opens one [`Neo4jGateway`] per worker.
#[derive(Debug, Clone)]
pub struct Neo4jSource {
    config: Neo4jConfig,
}

impl Neo4jSource {
    pub fn new(config: Neo4jConfig) -> Self {
        Self { config }
    }
}

impl GatewaySource for Neo4jSource {
    type Session = Neo4jGateway;

    fn open_session(&self) -> GraphResult<Self::Session> {
        Ok(Neo4jGateway::new(&self.config))
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

fn malformed(message: impl Into<String>) -> GraphError {
    GraphError::MalformedResponse {
        message: message.into(),
    }
}

/// Extract the rows of the first result, surfacing server-side errors.
fn parse_rows(mut json: Value) -> GraphResult<Vec<Vec<Value>>> {
    if let Some(errors) = json["errors"].as_array()
        && let Some(first) = errors.first()
    {
        return Err(GraphError::Query {
            message: format!(
                "{}: {}",
                first["code"].as_str().unwrap_or("unknown"),
                first["message"].as_str().unwrap_or("")
            ),
        });
    }

    let Some(Value::Array(data)) = json.pointer_mut("/results/0/data").map(Value::take) else {
        return Err(malformed("missing results[0].data"));
    };

    data.into_iter()
        .map(|mut entry| match entry.get_mut("row").map(Value::take) {
            Some(Value::Array(row)) => Ok(row),
            _ => Err(malformed("data entry without a row array")),
        })
        .collect()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn node_from_row(mut row: Vec<Value>) -> GraphResult<GraphNode> {
    if row.len() < 3 {
        return Err(malformed(format!("node row has {} columns, expected 3", row.len())));
    }
    let element_id = row[0]
        .as_str()
        .ok_or_else(|| malformed("node element_id is not a string"))?
        .to_string();
    let labels = string_list(&row[1]);
    let properties: Properties = match row[2].take() {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        Value::Null => Properties::new(),
        _ => return Err(malformed("node properties is not a map")),
    };
    Ok(GraphNode {
        element_id,
        labels,
        properties,
    })
}

fn candidate_from_row(row: Vec<Value>) -> GraphResult<PredecessorCandidate> {
    let [source_id, doc_id, rel_type] = <[Value; 3]>::try_from(row)
        .map_err(|r| malformed(format!("predecessor row has {} columns, expected 3", r.len())))?;
    let predecessor_id = source_id
        .as_str()
        .ok_or_else(|| malformed("predecessor id is not a string"))?
        .to_string();
    let relation_type = rel_type
        .as_str()
        .ok_or_else(|| malformed("relation type is not a string"))?
        .to_string();
    let document_id = super::PropertyValue::from(doc_id).document_key();
    Ok(PredecessorCandidate {
        predecessor_id,
        document_id,
        relation_type,
    })
}

/// Decode one aggregate row. Rows whose name is not a string are skipped.
fn degree_from_row(row: Vec<Value>) -> Option<GraphResult<DegreeRecord>> {
    if row.len() < 7 {
        return Some(Err(malformed(format!(
            "degree row has {} columns, expected 7",
            row.len()
        ))));
    }
    let name = row[1].as_str()?.to_string();
    let count = |v: &Value| v.as_u64().map(|n| n as usize);
    let decoded = (|| {
        Some(DegreeRecord {
            element_id: row[0].as_str()?.to_string(),
            name,
            labels: string_list(&row[2]),
            in_degree: count(&row[3])?,
            out_degree: count(&row[4])?,
            has_definition: row[5].as_bool()?,
            has_function: row[6].as_bool()?,
        })
    })();
    Some(decoded.ok_or_else(|| malformed("degree row has unexpected column types")))
}

/// `Authorization` header value for HTTP basic auth.
fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", base64_encode(format!("{user}:{password}").as_bytes()))
}

// Standard alphabet with padding, RFC 4648 §4.
fn base64_encode(input: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        for i in 0..4 {
            if i <= chunk.len() {
                out.push(ALPHABET[((n >> (18 - 6 * i)) & 0x3f) as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}
