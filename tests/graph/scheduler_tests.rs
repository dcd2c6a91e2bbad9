use serde_json::{json, Value};

use xflow::dsl::FlowSchema;
use xflow::{
    build_graph, create_event_channel, ComponentLoader, ErrorKind, FlowError, FlowEvent, Graph,
    RunState, StepOutcome,
};

fn echo_node(id: &str) -> Value {
    json!({"id": id, "data": {"type": "Echo", "node": {
        "display_name": id,
        "template": {
            "code": {"type": "code", "value":
                "class Echo { build() { return (this.upstream || '') + this.label; } }"},
            "label": {"type": "str", "value": id}
        }
    }}})
}

fn graph(nodes: Vec<Value>, edges: Value) -> Graph {
    let schema: FlowSchema =
        serde_json::from_value(json!({"nodes": nodes, "edges": edges})).unwrap();
    build_graph(&schema)
}

fn built_ids(items: &[Result<StepOutcome, FlowError>]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Ok(StepOutcome::Built(result)) => Some(result.vertex_id.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_edgeless_graphs_fail_prepare() {
    for n in 1..4 {
        let nodes = (0..n).map(|i| echo_node(&format!("v{i}"))).collect();
        let mut g = graph(nodes, json!([]));
        let err = g.prepare(None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphIntegrity, "n = {n}");
        assert_eq!(g.run_state(), RunState::Idle);
    }
}

#[test]
fn test_empty_graph_finishes_immediately() {
    let loader = ComponentLoader::new();
    let mut g = graph(vec![], json!([]));
    g.prepare(None, None).unwrap();
    let items: Vec<_> = g.start(&loader).unwrap().collect();
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Ok(StepOutcome::Finish)));
}

#[test]
fn test_cycle_and_dangling_edge_rejected() {
    let mut cyclic = graph(
        vec![echo_node("a"), echo_node("b")],
        json!([{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]),
    );
    assert!(matches!(
        cyclic.prepare(None, None),
        Err(FlowError::GraphIntegrity(msg)) if msg.contains("cycle")
    ));

    let mut dangling = graph(
        vec![echo_node("a"), echo_node("b")],
        json!([{"source": "a", "target": "b"}, {"source": "a", "target": "nowhere"}]),
    );
    assert!(matches!(
        dangling.prepare(None, None),
        Err(FlowError::GraphIntegrity(msg)) if msg.contains("nowhere")
    ));
}

#[cfg(feature = "builtin-sandbox-js")]
mod js {
    use super::*;
    use futures::StreamExt;

    fn linear() -> Graph {
        graph(
            vec![echo_node("A"), echo_node("B")],
            json!([{"source": "A", "target": "B", "target_input": "upstream"}]),
        )
    }

    #[test]
    fn test_two_vertex_run_yields_three_elements() {
        let loader = ComponentLoader::new();
        let mut g = linear();
        g.prepare(None, None).unwrap();
        let items: Vec<_> = g.start(&loader).unwrap().collect();

        assert_eq!(items.len(), 3);
        assert_eq!(built_ids(&items), vec!["A", "B"]);
        assert!(matches!(items[2], Ok(StepOutcome::Finish)));
        let b = g.vertex("B").unwrap().result.as_ref().unwrap();
        assert_eq!(b.outputs[0].value, json!("AB"));
    }

    #[test]
    fn test_stopping_after_one_element_leaves_b_unbuilt() {
        let loader = ComponentLoader::new();
        let mut g = linear();
        g.prepare(None, None).unwrap();
        let first: Vec<_> = g.start(&loader).unwrap().take(1).collect();

        assert_eq!(first.len(), 1);
        assert!(first[0].is_ok());
        assert!(g.vertex("A").unwrap().is_built());
        assert!(!g.vertex("B").unwrap().is_built());
        assert_eq!(g.call_order(), ["A"]);
    }

    #[test]
    fn test_results_recorded_before_dependents_start() {
        let loader = ComponentLoader::new();
        let (sender, mut receiver) = create_event_channel();
        let mut g = graph(
            vec![echo_node("d"), echo_node("b"), echo_node("c"), echo_node("a")],
            json!([
                {"source": "a", "target": "b"},
                {"source": "a", "target": "c"},
                {"source": "b", "target": "d"},
                {"source": "c", "target": "d"}
            ]),
        )
        .with_settings(xflow::graph::RunSettings {
            events: Some(sender),
            ..Default::default()
        });
        g.prepare(None, None).unwrap();
        let items: Vec<_> = g.start(&loader).unwrap().collect();
        assert_eq!(built_ids(&items), vec!["a", "b", "c", "d"]);

        let mut timeline = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            match event {
                FlowEvent::VertexStarted { vertex_id, .. } => timeline.push(format!("start:{vertex_id}")),
                FlowEvent::VertexBuilt { vertex_id, .. } => timeline.push(format!("built:{vertex_id}")),
                FlowEvent::RunFinished { built, .. } => timeline.push(format!("finished:{built}")),
                _ => {}
            }
        }
        let pos = |s: &str| timeline.iter().position(|t| t == s).unwrap();
        for (source, target) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
            assert!(pos(&format!("built:{source}")) < pos(&format!("start:{target}")));
        }
        assert_eq!(timeline.last().map(String::as_str), Some("finished:4"));
    }

    #[test]
    fn test_build_failure_preserves_completed_results() {
        let loader = ComponentLoader::new();
        let mut nodes = vec![echo_node("ok")];
        nodes.push(json!({"id": "bad", "data": {"type": "Bad", "node": {"template": {
            "code": {"type": "code", "value": "class Bad { build() { throw new Error('kaput'); } }"}
        }}}}));
        let mut g = graph(nodes, json!([{"source": "ok", "target": "bad"}]));
        g.prepare(None, None).unwrap();
        let items: Vec<_> = g.start(&loader).unwrap().collect();

        assert_eq!(items.len(), 2);
        let err = items[1].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ComponentBuild);
        assert_eq!(err.vertex_id(), Some("bad"));
        assert!(g.vertex("ok").unwrap().is_built());
        assert_eq!(g.run_state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_async_start_matches_blocking_order() {
        let loader = ComponentLoader::new();
        let mut g = linear();
        g.prepare(None, None).unwrap();
        let items: Vec<_> = g.async_start(&loader).unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(built_ids(&items), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_start_component_reuses_upstream_results() {
        let loader = ComponentLoader::new();
        let mut g = linear();
        g.prepare(None, None).unwrap();
        while !g.async_step(&loader).await.unwrap().is_finish() {}

        g.prepare(None, Some("B")).unwrap();
        let items: Vec<_> = g.async_start(&loader).unwrap().collect().await;
        assert_eq!(built_ids(&items), vec!["B"]);
        assert!(g.vertex("A").unwrap().is_built());
        let b = g.vertex("B").unwrap().result.as_ref().unwrap();
        assert_eq!(b.outputs[0].value, json!("AB"));
    }
}
