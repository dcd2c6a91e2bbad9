use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use xflow_types::ComponentDescriptor;

use crate::dsl::schema::{FlowSchema, CODE_FIELD};

use super::types::{Edge, ParamField, Vertex, VertexState};
use super::Graph;

/// Build an in-memory graph from a stored definition.
///
/// Structural problems (dangling edges, duplicate ids, cycles) are not
/// rejected here; they surface from [`Graph::prepare`] and validation.
pub fn build_graph(schema: &FlowSchema) -> Graph {
    let mut vertices: Vec<Vertex> = schema
        .nodes
        .iter()
        .map(|node| {
            let component = &node.data.node;
            let mut descriptor = ComponentDescriptor::new(
                node.component_type(),
                node.source_text().unwrap_or_default(),
            );
            if let Some(base_type) = &component.base_type {
                descriptor = descriptor.with_base_type(base_type.clone());
            }
            descriptor.declared_outputs = component.outputs.clone();

            let params: BTreeMap<String, ParamField> = component
                .template
                .iter()
                .filter(|(name, _)| name.as_str() != CODE_FIELD)
                .map(|(name, field)| (name.clone(), ParamField::from(field)))
                .collect();

            Vertex {
                id: node.id.clone(),
                display_name: node.display_name().to_string(),
                alias: node.alias().map(str::to_string),
                descriptor: Arc::new(descriptor),
                params,
                state: VertexState::Pending,
                result: None,
            }
        })
        .collect();

    assign_system_aliases(&mut vertices);

    let edges = schema
        .edges
        .iter()
        .enumerate()
        .map(|(i, e)| Edge {
            id: e
                .id
                .clone()
                .unwrap_or_else(|| format!("{}-{}-{}", e.source, e.target, i)),
            source: e.source.clone(),
            target: e.target.clone(),
            source_output: e.source_output.clone(),
            target_input: e.target_input.clone(),
        })
        .collect();

    let mut graph = Graph::new(vertices, edges);
    if let Some(id) = &schema.id {
        graph.flow_id = id.clone();
    }
    graph
}

/// Give every unaliased vertex that shares its component type with another
/// vertex an alias `DisplayName#N`, numbered from 1 in insertion order.
pub(crate) fn assign_system_aliases(vertices: &mut [Vertex]) {
    let mut per_type: HashMap<String, usize> = HashMap::new();
    for v in vertices.iter() {
        *per_type.entry(v.component_type().to_string()).or_default() += 1;
    }

    let mut taken: HashSet<String> = vertices.iter().filter_map(|v| v.alias.clone()).collect();
    let mut counters: HashMap<String, usize> = HashMap::new();

    for v in vertices.iter_mut() {
        let shared = per_type.get(v.component_type()).copied().unwrap_or(0) > 1;
        let counter = counters.entry(v.component_type().to_string()).or_default();
        *counter += 1;
        if !shared || v.alias.is_some() {
            continue;
        }
        let mut n = *counter;
        let mut alias = format!("{}#{}", v.display_name, n);
        while taken.contains(&alias) {
            n += 1;
            alias = format!("{}#{}", v.display_name, n);
        }
        taken.insert(alias.clone());
        v.alias = Some(alias);
    }
}
