use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use xflow::{
    create_event_channel, parse_dsl, AuditLogger, ComponentLoader, DslFormat, ErrorKind,
    FlowEvent, FlowRunner, FlowSchema, InMemoryTransactionSink, RunInputs, RuntimeConfig,
    SecurityEvent, Tweaks,
};

const CHAT_FLOW: &str = r#"
id: chat
nodes:
  - id: chat_in
    data:
      type: ChatInput
      node:
        display_name: Chat Input
        template:
          input_value: {type: str, value: ""}
          code:
            type: code
            value: |
              class ChatInput {
                build() { return Message(this.input_value, "User"); }
              }
  - id: upper
    data:
      type: Upper
      node:
        display_name: Upper
        template:
          text: {type: str, value: ""}
          suffix: {type: str, value: "."}
          code:
            type: code
            value: |
              class Upper {
                build() { return this.text.toUpperCase() + this.suffix; }
              }
  - id: chat_out
    data:
      type: ChatOutput
      node:
        display_name: Chat Output
        template:
          input_value: {type: str, value: ""}
          code:
            type: code
            value: |
              class ChatOutput {
                *build() {
                  for (const word of this.input_value.split(" ")) { yield word + " "; }
                }
              }
edges:
  - {source: chat_in, target: upper, target_input: text}
  - {source: upper, target: chat_out, target_input: input_value}
"#;

fn chat_flow() -> FlowSchema {
    parse_dsl(CHAT_FLOW, DslFormat::Yaml).unwrap()
}

fn tweaks(value: Value) -> Tweaks {
    serde_json::from_value(value).unwrap()
}

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

#[test]
fn test_parse_dsl_formats_agree() {
    let json_flow = r#"{
        "nodes": [
            {"id": "a", "data": {"type": "A", "node": {"template": {"x": {"type": "int", "value": 1}}}}},
            {"id": "b", "data": {"type": "B"}}
        ],
        "edges": [{"source": "a", "target": "b", "target_input": "x"}]
    }"#;
    let toml_flow = r#"
[[nodes]]
id = "a"
[nodes.data]
type = "A"
[nodes.data.node.template.x]
type = "int"
value = 1

[[nodes]]
id = "b"
[nodes.data]
type = "B"

[[edges]]
source = "a"
target = "b"
target_input = "x"
"#;
    let from_json = parse_dsl(json_flow, DslFormat::Json).unwrap();
    let from_toml = parse_dsl(toml_flow, DslFormat::Toml).unwrap();
    assert_eq!(from_json, from_toml);
    assert_eq!(from_json.nodes.len(), 2);

    let err = parse_dsl("nodes: [", DslFormat::Yaml).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_validate_reports_without_building() {
    let runner = FlowRunner::builder(chat_flow())
        .tweaks(tweaks(json!({
            "upper": {"suffix": "!"},
            "Upper": {"suffix": "?"},
            "Nobody": {"x": 1}
        })))
        .build();

    let diagnostics = runner.validate();
    let codes: Vec<&str> = diagnostics.iter().map(|d| d.code.as_str()).collect();
    assert!(codes.contains(&"E201"), "{codes:?}");
    assert!(codes.contains(&"W201"), "{codes:?}");
    assert_eq!(runner.loader().stats().builds, 0);

    let edgeless = FlowRunner::builder(
        serde_json::from_value(json!({"nodes": [{"id": "a", "data": {"type": "A"}}], "edges": []}))
            .unwrap(),
    )
    .build();
    let codes: Vec<String> = edgeless.validate().into_iter().map(|d| d.code).collect();
    assert_eq!(codes, vec!["E004".to_string()]);
}

#[test]
fn test_tweak_conflict_fails_before_any_build() {
    let sink = Arc::new(InMemoryTransactionSink::new());
    let failure = FlowRunner::builder(chat_flow())
        .tweaks(tweaks(json!({"upper": {"suffix": "!"}, "Upper": {"suffix": "?"}})))
        .transaction_sink(sink.clone())
        .build()
        .run()
        .unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::TweakResolution);
    assert!(failure.completed.is_empty());
    assert!(sink.transactions().is_empty());
}

#[cfg(feature = "builtin-sandbox-js")]
mod js {
    use super::*;

    #[test]
    fn test_full_run_with_inputs_tweaks_and_stream() {
        let sink = Arc::new(InMemoryTransactionSink::new());
        let outputs = FlowRunner::builder(chat_flow())
            .inputs(RunInputs::chat("hello big world"))
            .tweaks(tweaks(json!({"Upper": {"suffix": "!"}})))
            .transaction_sink(sink.clone())
            .build()
            .run()
            .unwrap();

        let order: Vec<&str> = outputs.iter().map(|o| o.vertex_id.as_str()).collect();
        assert_eq!(order, vec!["chat_in", "upper", "chat_out"]);

        let message = outputs[0].primary().unwrap();
        assert_eq!(message["text"], json!("hello big world"));
        assert_eq!(outputs[1].primary(), Some(&json!("HELLO BIG WORLD!")));
        assert_eq!(outputs[2].primary(), Some(&json!("HELLO BIG WORLD! ")));

        let builds = sink.vertex_builds();
        assert_eq!(builds.len(), 3);
        let out = builds.iter().find(|b| b.vertex_id == "chat_out").unwrap();
        assert_eq!(out.artifacts["result"]["kind"], json!("stream"));
        assert_eq!(out.artifacts["result"]["raw"], json!(""));
        assert_eq!(out.data["result"], json!(""));

        let transactions = sink.transactions();
        assert_eq!(transactions.len(), 3);
        let first = transactions.iter().find(|t| t.vertex_id == "chat_in").unwrap();
        assert_eq!(first.target_id.as_deref(), Some("upper"));
        let last = transactions.iter().find(|t| t.vertex_id == "chat_out").unwrap();
        assert_eq!(last.target_id, None);
        assert_eq!(last.inputs["input_value"], json!("HELLO BIG WORLD!"));
    }

    #[tokio::test]
    async fn test_stream_chunks_published_as_events() {
        let (sender, mut receiver) = create_event_channel();
        let runner = FlowRunner::builder(chat_flow())
            .inputs(RunInputs::chat("a b"))
            .event_sender(sender)
            .build();
        runner.run_async().await.unwrap();
        drop(runner);

        let mut chunks = Vec::new();
        let mut finished = false;
        while let Some(event) = receiver.recv().await {
            match event {
                FlowEvent::StreamChunk { vertex_id, chunk, index, .. } => {
                    assert_eq!(vertex_id, "chat_out");
                    assert_eq!(index, chunks.len());
                    chunks.push(chunk);
                }
                FlowEvent::RunFinished { built, .. } => {
                    assert_eq!(built, 3);
                    finished = true;
                }
                _ => {}
            }
        }
        assert_eq!(chunks, vec![json!("A "), json!("B. ")]);
        assert!(finished);
    }

    #[tokio::test]
    async fn test_security_violation_mid_run_keeps_completed_outputs() {
        let flow: FlowSchema = serde_json::from_value(json!({
            "nodes": [
                {"id": "ok", "data": {"type": "Ok", "node": {"template": {
                    "code": {"type": "code", "value": "class Ok { build() { return 'fine'; } }"}
                }}}},
                {"id": "shell", "data": {"type": "Shell", "node": {"template": {
                    "code": {"type": "code", "value":
                        "const sp = require('subprocess');\nclass Shell { build() { return sp.run(['id']); } }"}
                }}}}
            ],
            "edges": [{"source": "ok", "target": "shell"}]
        }))
        .unwrap();
        let audit = Arc::new(RecordingAudit::default());

        let failure = FlowRunner::builder(flow)
            .audit_logger(audit.clone())
            .build()
            .run_async()
            .await
            .unwrap_err();

        assert_eq!(failure.error.kind(), ErrorKind::SecurityViolation);
        assert_eq!(failure.error.vertex_id(), Some("shell"));
        assert_eq!(failure.completed.len(), 1);
        assert_eq!(failure.completed[0].primary(), Some(&json!("fine")));
        assert_eq!(audit.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stream_yields_each_vertex() {
        let runner = FlowRunner::builder(chat_flow())
            .inputs(RunInputs::chat("x"))
            .build();
        let items: Vec<_> = runner.run_stream().collect().await;
        let ids: Vec<String> = items
            .into_iter()
            .map(|item| item.unwrap().vertex_id)
            .collect();
        assert_eq!(ids, vec!["chat_in", "upper", "chat_out"]);
    }

    #[test]
    fn test_stop_component_builds_ancestors_only() {
        let outputs = FlowRunner::builder(chat_flow())
            .inputs(RunInputs::chat("x"))
            .stop_component_id("upper")
            .build()
            .run()
            .unwrap();
        let ids: Vec<&str> = outputs.iter().map(|o| o.vertex_id.as_str()).collect();
        assert_eq!(ids, vec!["chat_in", "upper"]);
    }

    #[test]
    fn test_shared_loader_compiles_once_across_runs() {
        let loader = Arc::new(ComponentLoader::new());
        let config = RuntimeConfig::from_toml_str("isolation_level = \"strict\"").unwrap();
        for word in ["one", "two"] {
            FlowRunner::builder(chat_flow())
                .inputs(RunInputs::chat(word))
                .config(config.clone())
                .loader(loader.clone())
                .build()
                .run()
                .unwrap();
        }
        let stats = loader.stats();
        assert_eq!(stats.compilations, 3);
        assert_eq!(stats.cache_hits, 3);
    }
}
