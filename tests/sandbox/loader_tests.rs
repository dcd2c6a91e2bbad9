#![cfg(feature = "builtin-sandbox-js")]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use xflow::dsl::FlowSchema;
use xflow::security::SecurityEventType;
use xflow::{
    build_graph, ArtifactKind, AuditLogger, BuildContext, ComponentLoader, ErrorKind, Graph,
    InMemoryVariableService, IsolationLevel, RuntimeConfig, SecurityEvent, VertexError,
};

#[derive(Default)]
struct RecordingAudit {
    events: Mutex<Vec<SecurityEvent>>,
}

#[async_trait]
impl AuditLogger for RecordingAudit {
    async fn log_event(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Single-vertex graph (plus a sink so it has an edge) around `code`.
fn component(code: &str, template: Value, outputs: Value) -> Graph {
    let mut fields = template.as_object().cloned().unwrap_or_default();
    fields.insert("code".into(), json!({"type": "code", "value": code}));
    let schema: FlowSchema = serde_json::from_value(json!({
        "nodes": [
            {"id": "c", "data": {"type": "Component", "node": {
                "template": fields, "outputs": outputs
            }}},
            {"id": "sink", "data": {"type": "Sink"}}
        ],
        "edges": [{"source": "c", "target": "sink"}]
    }))
    .unwrap();
    build_graph(&schema)
}

fn ctx(level: IsolationLevel) -> BuildContext {
    BuildContext::new("flow-1", &RuntimeConfig::default().with_isolation_level(level))
}

async fn build(
    loader: &ComponentLoader,
    graph: &Graph,
    level: IsolationLevel,
) -> Result<xflow::VertexBuildResult, VertexError> {
    loader
        .build_vertex(graph.vertex("c").unwrap(), &BTreeMap::new(), &ctx(level))
        .await
}

const WRITE_MARKER: &str = r#"
const fs = require("fs");
class Component {
    build() {
        fs.writeText(this.path, "written");
        return "done";
    }
}
"#;

#[tokio::test]
async fn test_blocked_module_rejected_before_any_side_effect() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker.txt");
    let graph = component(
        WRITE_MARKER,
        json!({"path": {"type": "str", "value": marker.to_string_lossy()}}),
        json!([]),
    );
    let audit = Arc::new(RecordingAudit::default());
    let loader = ComponentLoader::new().with_audit_logger(audit.clone());

    let err = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);
    assert!(err.to_string().contains("fs"), "{err}");
    assert!(!marker.exists());

    assert_eq!(loader.stats().security_violations, 1);
    let events = audit.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].event_type,
        SecurityEventType::SandboxViolation { level: IsolationLevel::Moderate, .. }
    ));
    assert_eq!(events[0].vertex_id.as_deref(), Some("c"));
}

#[tokio::test]
async fn test_disabled_level_permits_the_same_component() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker.txt");
    let graph = component(
        WRITE_MARKER,
        json!({"path": {"type": "str", "value": marker.to_string_lossy()}}),
        json!([]),
    );
    let loader = ComponentLoader::new();

    let result = build(&loader, &graph, IsolationLevel::Disabled).await.unwrap();
    assert_eq!(result.outputs[0].value, json!("done"));
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "written");
}

#[tokio::test]
async fn test_dynamic_require_violation_survives_catch() {
    let graph = component(
        r#"
class Component {
    build() {
        try { require(["o", "s"].join("")); } catch (e) { return "swallowed"; }
        return "unreachable";
    }
}
"#,
        json!({}),
        json!([]),
    );
    let loader = ComponentLoader::new();
    let err = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap_err();
    assert!(matches!(err, VertexError::SecurityViolation(ref msg) if msg.contains("os")));
}

#[tokio::test]
async fn test_strict_level_blocks_modules_moderate_allows() {
    let graph = component(
        r#"
const time = require("time");
class Component { build() { return typeof time.now(); } }
"#,
        json!({}),
        json!([]),
    );
    let loader = ComponentLoader::new();
    let ok = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap();
    assert_eq!(ok.outputs[0].value, json!("number"));

    let err = build(&loader, &graph, IsolationLevel::Strict).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);
}

#[tokio::test]
async fn test_error_kinds_are_distinct() {
    let loader = ComponentLoader::new();
    let level = IsolationLevel::Moderate;

    let throws = component(
        "class Component { build() { throw new Error('boom'); } }",
        json!({}),
        json!([]),
    );
    let err = build(&loader, &throws, level).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ComponentBuild);
    assert!(err.to_string().contains("boom"));

    let broken = component("class Component { build() { return 1; }", json!({}), json!([]));
    let err = build(&loader, &broken, level).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compilation);

    let reflective = component(
        "class Component { build() { return ({}).__proto__; } }",
        json!({}),
        json!([]),
    );
    let err = build(&loader, &reflective, level).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);

    let missing = component(
        "class helper { build() { return 1; } }",
        json!({}),
        json!([]),
    );
    let err = build(&loader, &missing, level).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ComponentBuild);
}

#[tokio::test]
async fn test_eval_unavailable_when_restricted() {
    let graph = component(
        "class Component { build() { return typeof eval; } }",
        json!({}),
        json!([]),
    );
    let loader = ComponentLoader::new();
    let moderate = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap();
    assert_eq!(moderate.outputs[0].value, json!("undefined"));
    let disabled = build(&loader, &graph, IsolationLevel::Disabled).await.unwrap();
    assert_eq!(disabled.outputs[0].value, json!("function"));
}

#[tokio::test]
async fn test_compiled_once_per_descriptor() {
    let graph = component(
        "class Component { build() { return this.n * 2; } }",
        json!({"n": {"type": "int", "value": 21}}),
        json!([]),
    );
    let loader = ComponentLoader::new();
    for _ in 0..3 {
        let result = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap();
        assert_eq!(result.outputs[0].value, json!(42));
    }
    let stats = loader.stats();
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.builds, 3);
    assert_eq!(loader.cached_components(), 1);
}

#[tokio::test]
async fn test_load_from_db_field_resolved_through_variable_service() {
    let graph = component(
        "class Component { build() { return 'key=' + this.api_key; } }",
        json!({"api_key": {"type": "str", "value": "OPENAI_KEY", "load_from_db": true}}),
        json!([]),
    );
    let variables = InMemoryVariableService::new().with_variable("default", "OPENAI_KEY", "sk-123");
    let loader = ComponentLoader::new().with_variable_service(Arc::new(variables));

    let result = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap();
    assert_eq!(result.outputs[0].value, json!("key=sk-123"));
    assert!(result.warnings.is_empty());

    let bare = ComponentLoader::new();
    let err = build(&bare, &graph, IsolationLevel::Moderate).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceResolution);
}

#[tokio::test]
async fn test_upstream_inputs_override_template_values() {
    let graph = component(
        "class Component { build() { return this.text + '!'; } }",
        json!({"text": {"type": "str", "value": "template"}}),
        json!([]),
    );
    let loader = ComponentLoader::new();
    let mut inputs = BTreeMap::new();
    inputs.insert("text".to_string(), json!("upstream"));
    let result = loader
        .build_vertex(graph.vertex("c").unwrap(), &inputs, &ctx(IsolationLevel::Moderate))
        .await
        .unwrap();
    assert_eq!(result.outputs[0].value, json!("upstream!"));
}

#[tokio::test]
async fn test_artifact_kinds_and_logs() {
    let graph = component(
        r#"
class Component {
    record() { console.log("building", 2, {ok: true}); return Data({score: 0.9}); }
    message() { return Message("hi there", "User"); }
    *chunks() { yield "a"; yield "b"; }
    list() { return [1, 2, 3]; }
    object() { return {k: "v"}; }
    number() { return 42; }
    text() { return "plain"; }
}
"#,
        json!({}),
        json!([
            {"name": "record", "method": "record"},
            {"name": "message", "method": "message"},
            {"name": "chunks", "method": "chunks"},
            {"name": "list", "method": "list"},
            {"name": "object", "method": "object"},
            {"name": "number", "method": "number"},
            {"name": "text", "method": "text"}
        ]),
    );
    let loader = ComponentLoader::new();
    let result = build(&loader, &graph, IsolationLevel::Moderate).await.unwrap();

    let kinds: Vec<(&str, ArtifactKind)> = result
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.artifact.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("record", ArtifactKind::StructuredRecord),
            ("message", ArtifactKind::Message),
            ("chunks", ArtifactKind::Stream),
            ("list", ArtifactKind::Array),
            ("object", ArtifactKind::Object),
            ("number", ArtifactKind::Unknown),
            ("text", ArtifactKind::Text),
        ]
    );

    let stream = result.output("chunks").unwrap();
    assert!(stream.artifact.has_pending_stream());
    assert_eq!(stream.artifact.raw, Value::Null);

    let message = result.output("message").unwrap();
    assert_eq!(message.value["text"], json!("hi there"));
    assert_eq!(message.value["sender"], json!("User"));

    assert_eq!(result.logs, vec![r#"building 2 {"ok":true}"#.to_string()]);
}
