//! Hosting graph analysis using `petgraph`.
//!
//! Edges point from a hosted node to its host. A well-formed topology has
//! at most one outgoing `HostedOn` edge per node and no cycle.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use toskose_common::error::{Result, ToskoseError};

use crate::model::{NodeId, RelationshipKind, TopologyModel};

/// The `HostedOn` edges of a linked topology.
#[derive(Debug)]
pub struct HostingGraph {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
}

impl HostingGraph {
    /// Builds the graph from a linked model.
    #[must_use]
    pub fn from_model(model: &TopologyModel) -> Self {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for (id, _) in model.nodes() {
            let _ = indices.insert(id, graph.add_node(id));
        }
        for (id, node) in model.nodes() {
            for target in node
                .relationships_of(RelationshipKind::HostedOn)
                .filter_map(|r| r.target_id())
            {
                let _ = graph.add_edge(indices[&id], indices[&target], ());
            }
        }
        Self { graph, indices }
    }

    /// Checks that every node has at most one host and that hosting is acyclic.
    ///
    /// # Errors
    ///
    /// Returns a parsing error naming the offending nodes.
    pub fn validate(&self, model: &TopologyModel) -> Result<()> {
        for (id, index) in &self.indices {
            if self.graph.neighbors(*index).count() > 1 {
                let name = &model.node(*id).name;
                tracing::error!(node = %name, "node declares more than one host");
                return Err(ToskoseError::parsing(format!(
                    "node {name} declares more than one host"
                )));
            }
        }

        if petgraph::algo::is_cyclic_directed(&self.graph) {
            let mut members: Vec<String> = petgraph::algo::tarjan_scc(&self.graph)
                .into_iter()
                .filter(|scc| {
                    scc.len() > 1 || scc.iter().any(|i| self.graph.contains_edge(*i, *i))
                })
                .flatten()
                .map(|i| model.node(self.graph[i]).name.clone())
                .collect();
            members.sort();
            tracing::error!(nodes = ?members, "cyclic hosting relationship");
            return Err(ToskoseError::parsing(format!(
                "cyclic hosting relationship between {}",
                members.join(", ")
            )));
        }
        Ok(())
    }

    /// Returns the direct host of a node.
    #[must_use]
    pub fn host_of(&self, id: NodeId) -> Option<NodeId> {
        let index = self.indices.get(&id)?;
        self.graph.neighbors(*index).next().map(|i| self.graph[i])
    }
}
