use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use super::types::{Edge, Vertex};

/// Index-based petgraph view over vertices and the edges whose endpoints
/// both exist.
pub(crate) struct GraphView<'a> {
    pub graph: DiGraph<&'a str, ()>,
    pub index: HashMap<&'a str, NodeIndex>,
}

impl<'a> GraphView<'a> {
    pub fn new(vertices: &'a [Vertex], edges: &'a [Edge]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for v in vertices {
            index
                .entry(v.id.as_str())
                .or_insert_with(|| graph.add_node(v.id.as_str()));
        }
        for e in edges {
            if let (Some(&s), Some(&t)) = (index.get(e.source.as_str()), index.get(e.target.as_str())) {
                graph.add_edge(s, t, ());
            }
        }
        Self { graph, index }
    }

    /// `id` and every vertex it depends on.
    pub fn ancestors(&self, id: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        if let Some(&start) = self.index.get(id) {
            let reversed = Reversed(&self.graph);
            let mut dfs = Dfs::new(reversed, start);
            while let Some(nx) = dfs.next(reversed) {
                found.insert(self.graph[nx].to_string());
            }
        }
        found
    }

    /// `id` and every vertex depending on it.
    pub fn descendants(&self, id: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        if let Some(&start) = self.index.get(id) {
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(nx) = dfs.next(&self.graph) {
                found.insert(self.graph[nx].to_string());
            }
        }
        found
    }

    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

/// In-degree per vertex, counting every edge inside `run_set`.
pub(crate) fn in_degrees(run_set: &HashSet<String>, edges: &[Edge]) -> HashMap<String, usize> {
    let mut degrees: HashMap<String, usize> = run_set.iter().map(|id| (id.clone(), 0)).collect();
    for e in edges {
        if run_set.contains(&e.source) && run_set.contains(&e.target) {
            if let Some(d) = degrees.get_mut(&e.target) {
                *d += 1;
            }
        }
    }
    degrees
}
