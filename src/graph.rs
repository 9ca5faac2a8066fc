//! A flattened, inspectable copy of an action graph.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Graph;
use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;

use crate::engine::{Action, ActionId};
use crate::error::BuildError;

/// Action names as nodes, with an edge from every dependency to its dependent.
#[derive(Debug, Default)]
pub struct ActionGraph {
    graph: Graph<String, ()>,
}

impl ActionGraph {
    /// Copies every action reachable from `root`. Shared actions become a
    /// single node.
    pub fn from_root(root: &Arc<Action>) -> Self {
        let mut graph = Graph::new();
        let mut seen = HashMap::new();
        Self::add(&mut graph, &mut seen, root);
        Self { graph }
    }

    fn add(
        graph: &mut Graph<String, ()>,
        seen: &mut HashMap<ActionId, NodeIndex>,
        action: &Arc<Action>,
    ) -> NodeIndex {
        let id = ActionId::of(action);
        if let Some(index) = seen.get(&id) {
            return *index;
        }

        let index = graph.add_node(action.name().to_owned());
        seen.insert(id, index);

        for dep in action.deps() {
            let dependency = Self::add(graph, seen, dep);
            graph.add_edge(dependency, index, ());
        }

        index
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graph.node_weights().any(|node| node == name)
    }

    /// Number of actions whose name starts with `prefix`, e.g. `"compile:"`.
    pub fn count(&self, prefix: &str) -> usize {
        self.graph
            .node_weights()
            .filter(|node| node.starts_with(prefix))
            .count()
    }

    /// Action names in an order that runs every dependency first.
    pub fn plan(&self) -> Result<Vec<&str>, BuildError> {
        let order = toposort(&self.graph, None)
            .map_err(|cycle| {
                BuildError::Graph(format!(
                    "cycle in action graph at \"{}\"",
                    self.graph[cycle.node_id()]
                ))
            })?;

        Ok(order
            .into_iter()
            .map(|index| self.graph[index].as_str())
            .collect())
    }

    /// Graphviz rendering of the graph.
    pub fn to_dot(&self) -> String {
        format!("{:?}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }
}
