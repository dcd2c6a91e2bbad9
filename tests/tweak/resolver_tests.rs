use serde_json::{json, Value};

use xflow::dsl::FlowSchema;
use xflow::tweak::{analyze_tweaks, IgnoreReason, MatchedBy};
use xflow::{
    apply_tweaks, build_graph, plan_tweaks, Graph, RunInputs, TweakResolutionError, Tweaks,
};

fn graph(value: Value) -> Graph {
    let schema: FlowSchema = serde_json::from_value(value).unwrap();
    build_graph(&schema)
}

fn tweaks(value: Value) -> Tweaks {
    serde_json::from_value(value).unwrap()
}

fn param(g: &Graph, id: &str, field: &str) -> Value {
    g.vertex(id).unwrap().params[field].value.clone()
}

/// Two `Foo` components (display name "Foo", system aliases `Foo#1`/`Foo#2`)
/// feeding a uniquely named sink.
fn foo_graph() -> Graph {
    graph(json!({
        "nodes": [
            {"id": "v1", "data": {"type": "Foo", "node": {"display_name": "Foo",
                "template": {"x": {"type": "int", "value": 0}}}}},
            {"id": "v2", "data": {"type": "Foo", "node": {"display_name": "Foo",
                "template": {"x": {"type": "int", "value": 0}}}}},
            {"id": "sink", "data": {"type": "Sink", "node": {"display_name": "Sink",
                "template": {
                    "label": {"type": "str", "value": "out"},
                    "attachment": {"type": "file", "value": "", "file_path": "/tmp/old.txt"}
                }}}}
        ],
        "edges": [{"source": "v1", "target": "sink"}, {"source": "v2", "target": "sink"}]
    }))
}

#[test]
fn test_system_aliases_assigned_to_shared_component_types() {
    let g = foo_graph();
    assert_eq!(g.vertex("v1").unwrap().alias.as_deref(), Some("Foo#1"));
    assert_eq!(g.vertex("v2").unwrap().alias.as_deref(), Some("Foo#2"));
    assert_eq!(g.vertex("sink").unwrap().alias, None);
}

#[test]
fn test_alias_wins_and_aliased_display_name_is_ignored() {
    let mut g = foo_graph();
    let report = apply_tweaks(
        &mut g,
        &tweaks(json!({"Foo#1": {"x": 5}, "Foo": {"x": 9}})),
        None,
    )
    .unwrap();

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].matched_by, MatchedBy::Alias);
    assert_eq!(param(&g, "v1", "x"), json!(5));
    assert_eq!(param(&g, "v2", "x"), json!(0));

    assert_eq!(report.ignored.len(), 1);
    assert_eq!(report.ignored[0].key, "Foo");
    assert_eq!(report.ignored[0].reason.code(), "W202");
}

#[test]
fn test_alias_application_is_idempotent() {
    let t = tweaks(json!({"Foo#2": {"x": 7}, "Sink": {"label": "final"}}));

    let mut once = foo_graph();
    apply_tweaks(&mut once, &t, None).unwrap();

    let mut twice = foo_graph();
    apply_tweaks(&mut twice, &t, None).unwrap();
    apply_tweaks(&mut twice, &t, None).unwrap();

    for (id, field) in [("v1", "x"), ("v2", "x"), ("sink", "label")] {
        assert_eq!(param(&once, id, field), param(&twice, id, field));
    }
    assert_eq!(param(&twice, "v2", "x"), json!(7));
}

#[test]
fn test_conflict_lists_both_keys_and_writes_nothing() {
    let mut g = foo_graph();
    let err = apply_tweaks(
        &mut g,
        &tweaks(json!({
            "v1": {"x": 1},
            "Foo#1": {"x": 2},
            "sink": {"label": "applied?"}
        })),
        None,
    )
    .unwrap_err();

    match &err {
        TweakResolutionError::Conflicting { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].vertex_id, "v1");
            assert_eq!(conflicts[0].field, "x");
            assert_eq!(conflicts[0].keys(), vec!["Foo#1", "v1"]);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("Foo#1") && message.contains("v1"), "{message}");

    assert_eq!(param(&g, "v1", "x"), json!(0));
    assert_eq!(param(&g, "sink", "label"), json!("out"));
}

#[test]
fn test_same_value_from_two_keys_is_not_a_conflict() {
    let mut g = foo_graph();
    let report = apply_tweaks(&mut g, &tweaks(json!({"v1": {"x": 3}, "Foo#1": {"x": 3}})), None)
        .unwrap();
    assert_eq!(report.applied.len(), 2);
    assert_eq!(param(&g, "v1", "x"), json!(3));
}

#[test]
fn test_display_name_shared_by_unaliased_vertices_is_ambiguous() {
    let mut g = graph(json!({
        "nodes": [
            {"id": "a", "data": {"type": "Left", "node": {"display_name": "Step",
                "template": {"x": {"type": "int", "value": 0}}}}},
            {"id": "b", "data": {"type": "Right", "node": {"display_name": "Step",
                "template": {"x": {"type": "int", "value": 0}}}}}
        ],
        "edges": [{"source": "a", "target": "b"}]
    }));

    let err = apply_tweaks(&mut g, &tweaks(json!({"Step": {"x": 1}})), None).unwrap_err();
    assert_eq!(
        err,
        TweakResolutionError::Ambiguous {
            key: "Step".to_string(),
            candidates: vec!["a".to_string(), "b".to_string()],
        }
    );
    assert_eq!(param(&g, "a", "x"), json!(0));
}

#[test]
fn test_file_field_writes_file_path_slot() {
    let mut g = foo_graph();
    let report = apply_tweaks(
        &mut g,
        &tweaks(json!({"Sink": {"attachment": "/data/new.txt"}})),
        None,
    )
    .unwrap();
    assert_eq!(report.applied[0].matched_by, MatchedBy::DisplayName);

    let field = &g.vertex("sink").unwrap().params["attachment"];
    assert_eq!(field.file_path, Some(json!("/data/new.txt")));
    assert_eq!(field.value, json!(""));
}

#[test]
fn test_unknown_keys_and_fields_are_reported_not_fatal() {
    let g = foo_graph();
    let report = plan_tweaks(
        g.vertices(),
        &tweaks(json!({
            "missing": {"x": 1},
            "sink": {"nope": 1, "code": "class Evil {}"}
        })),
        None,
    )
    .unwrap();

    assert!(report.applied.is_empty());
    let mut codes: Vec<&str> = report.ignored.iter().map(|i| i.reason.code()).collect();
    codes.sort_unstable();
    assert_eq!(codes, vec!["W201", "W203", "W204"]);
    assert!(report
        .ignored
        .iter()
        .any(|i| matches!(i.reason, IgnoreReason::CodeField { ref vertex_id } if vertex_id == "sink")));
}

#[test]
fn test_flat_keys_expand_to_vertex_and_field() {
    let mut g = foo_graph();
    apply_tweaks(&mut g, &tweaks(json!({"Foo#2|x": 4, "sink|label": "flat"})), None).unwrap();
    assert_eq!(param(&g, "v2", "x"), json!(4));
    assert_eq!(param(&g, "sink", "label"), json!("flat"));
}

#[test]
fn test_non_object_value_for_plain_key_is_rejected() {
    let g = foo_graph();
    let err = plan_tweaks(g.vertices(), &tweaks(json!({"sink": 3})), None).unwrap_err();
    assert_eq!(err, TweakResolutionError::NotAnObject { key: "sink".to_string() });
}

#[test]
fn test_tweaked_input_value_conflicts_with_run_input() {
    let g = graph(json!({
        "nodes": [
            {"id": "in", "data": {"type": "ChatInput", "node": {"display_name": "Chat Input",
                "template": {"input_value": {"type": "str", "value": ""}}}}},
            {"id": "out", "data": {"type": "ChatOutput", "node": {"display_name": "Chat Output",
                "template": {"input_value": {"type": "str", "value": ""}}}}}
        ],
        "edges": [{"source": "in", "target": "out", "target_input": "input_value"}]
    }));
    let t = tweaks(json!({"Chat Input": {"input_value": "from tweak"}}));

    let analysis = analyze_tweaks(g.vertices(), &t, Some(&RunInputs::chat("from run")));
    assert!(analysis.errors.iter().any(|e| matches!(
        e,
        TweakResolutionError::InputConflict { vertex_id, key } if vertex_id == "in" && key == "Chat Input"
    )));

    assert!(plan_tweaks(g.vertices(), &t, None).is_ok());
}

#[test]
fn test_analysis_collects_every_error() {
    let g = foo_graph();
    let analysis = analyze_tweaks(
        g.vertices(),
        &tweaks(json!({"sink": 3, "v1": {"x": 1}, "Foo#1": {"x": 2}})),
        None,
    );
    assert_eq!(analysis.errors.len(), 2);
    assert!(analysis.into_result().is_err());
}
