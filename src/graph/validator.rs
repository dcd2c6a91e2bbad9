use std::collections::HashSet;

use serde::Serialize;

use crate::error::FlowError;

use super::traversal::GraphView;
use super::types::{Edge, Vertex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntegrityCode {
    DuplicateVertex,
    DanglingEdge,
    Edgeless,
    Cycle,
    StreamSequence,
}

impl IntegrityCode {
    /// Diagnostic code reported by validation.
    pub fn code(&self) -> &'static str {
        match self {
            IntegrityCode::DuplicateVertex => "E002",
            IntegrityCode::DanglingEdge => "E003",
            IntegrityCode::Edgeless => "E004",
            IntegrityCode::Cycle => "E101",
            IntegrityCode::StreamSequence => "E102",
        }
    }
}

/// One structural problem with a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityIssue {
    pub code: IntegrityCode,
    pub message: String,
    pub vertex_id: Option<String>,
    pub edge_id: Option<String>,
}

/// Every structural problem, in a stable order.
pub fn integrity_issues(vertices: &[Vertex], edges: &[Edge]) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    // 1. Edgeless non-empty graph
    if !vertices.is_empty() && edges.is_empty() {
        issues.push(IntegrityIssue {
            code: IntegrityCode::Edgeless,
            message: format!(
                "graph has {} vertices and no edges; an unordered component set cannot be run",
                vertices.len()
            ),
            vertex_id: None,
            edge_id: None,
        });
    }

    // 2. Duplicate vertex ids
    let mut seen = HashSet::new();
    for v in vertices {
        if !seen.insert(v.id.as_str()) {
            issues.push(IntegrityIssue {
                code: IntegrityCode::DuplicateVertex,
                message: format!("duplicate vertex id '{}'", v.id),
                vertex_id: Some(v.id.clone()),
                edge_id: None,
            });
        }
    }

    // 3. Dangling endpoints
    for e in edges {
        for (role, endpoint) in [("source", &e.source), ("target", &e.target)] {
            if !seen.contains(endpoint.as_str()) {
                issues.push(IntegrityIssue {
                    code: IntegrityCode::DanglingEdge,
                    message: format!("edge '{}' {} '{}' does not exist", e.id, role, endpoint),
                    vertex_id: None,
                    edge_id: Some(e.id.clone()),
                });
            }
        }
    }

    // 4. Cycles
    let view = GraphView::new(vertices, edges);
    if view.is_cyclic() {
        issues.push(IntegrityIssue {
            code: IntegrityCode::Cycle,
            message: "graph contains a cycle".to_string(),
            vertex_id: None,
            edge_id: None,
        });
    }

    // 5. A streaming vertex may only feed output vertices
    for v in vertices.iter().filter(|v| v.is_streaming()) {
        for e in edges.iter().filter(|e| e.source == v.id) {
            let feeds_output = vertices
                .iter()
                .find(|t| t.id == e.target)
                .map(|t| t.is_output())
                .unwrap_or(true);
            if !feeds_output {
                issues.push(IntegrityIssue {
                    code: IntegrityCode::StreamSequence,
                    message: format!(
                        "streaming vertex '{}' feeds non-output vertex '{}'",
                        v.id, e.target
                    ),
                    vertex_id: Some(v.id.clone()),
                    edge_id: Some(e.id.clone()),
                });
            }
        }
    }

    issues
}

/// Fail with the first structural problem, if any.
pub fn check_integrity(vertices: &[Vertex], edges: &[Edge]) -> Result<(), FlowError> {
    match integrity_issues(vertices, edges).into_iter().next() {
        Some(issue) => Err(FlowError::GraphIntegrity(issue.message)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::FlowSchema;
    use crate::graph::build_graph;
    use serde_json::json;

    fn issues(value: serde_json::Value) -> Vec<IntegrityIssue> {
        let schema: FlowSchema = serde_json::from_value(value).unwrap();
        let graph = build_graph(&schema);
        integrity_issues(graph.vertices(), graph.edges())
    }

    #[test]
    fn test_valid_dag() {
        let found = issues(json!({
            "nodes": [{"id": "a", "data": {"type": "A"}}, {"id": "b", "data": {"type": "B"}}],
            "edges": [{"source": "a", "target": "b"}]
        }));
        assert!(found.is_empty(), "{found:?}");
    }

    #[test]
    fn test_edgeless() {
        let found = issues(json!({
            "nodes": [{"id": "a", "data": {"type": "A"}}, {"id": "b", "data": {"type": "B"}}]
        }));
        assert_eq!(found[0].code, IntegrityCode::Edgeless);
    }

    #[test]
    fn test_empty_graph_is_not_edgeless() {
        assert!(issues(json!({"nodes": [], "edges": []})).is_empty());
    }

    #[test]
    fn test_detect_cycle() {
        let found = issues(json!({
            "nodes": [{"id": "a", "data": {"type": "A"}}, {"id": "b", "data": {"type": "B"}}],
            "edges": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]
        }));
        assert!(found.iter().any(|i| i.code == IntegrityCode::Cycle));
    }

    #[test]
    fn test_dangling_and_duplicate() {
        let found = issues(json!({
            "nodes": [{"id": "a", "data": {"type": "A"}}, {"id": "a", "data": {"type": "B"}}],
            "edges": [{"id": "e1", "source": "a", "target": "ghost"}]
        }));
        assert!(found.iter().any(|i| i.code == IntegrityCode::DuplicateVertex));
        let dangling = found
            .iter()
            .find(|i| i.code == IntegrityCode::DanglingEdge)
            .unwrap();
        assert_eq!(dangling.edge_id.as_deref(), Some("e1"));
        assert!(dangling.message.contains("ghost"));
    }

    #[test]
    fn test_stream_sequence_rule() {
        let found = issues(json!({
            "nodes": [
                {"id": "llm", "data": {"type": "Model", "node": {"template": {"stream": {"type": "bool", "value": true}}}}},
                {"id": "parse", "data": {"type": "Parser"}},
                {"id": "out", "data": {"type": "ChatOutput"}}
            ],
            "edges": [{"source": "llm", "target": "parse"}, {"source": "llm", "target": "out"}]
        }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, IntegrityCode::StreamSequence);
        assert_eq!(found[0].code.code(), "E102");
    }
}
