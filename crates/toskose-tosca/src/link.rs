//! Relationship linking and the hosting extension pass.
//!
//! Linking runs once every node exists: string targets become [`NodeId`]s
//! and each target records a back-link. The extension pass then computes
//! the owning container of every software component, fills the hosted
//! lists of containers, and promotes connections that target software
//! components to their host containers.

use toskose_common::error::{Result, ToskoseError};

use crate::graph::HostingGraph;
use crate::model::{
    BackLink, NodeId, NodeKind, RelationshipKind, RelationshipTarget, TopologyModel,
};

/// Rewrites relationship targets into node ids and records back-links.
///
/// # Errors
///
/// Returns a parsing error if a relationship targets an unknown node.
pub fn link(model: &mut TopologyModel) -> Result<()> {
    let mut resolved = Vec::new();
    for (source, node) in model.nodes() {
        for (index, relationship) in node.relationships.iter().enumerate() {
            let target = match &relationship.target {
                RelationshipTarget::Node(id) => *id,
                RelationshipTarget::Name(name) => model.id_of(name).ok_or_else(|| {
                    tracing::error!(
                        node = %node.name,
                        target = %name,
                        "relationship to unknown node"
                    );
                    ToskoseError::parsing(format!(
                        "node {} refers to unknown node {name}",
                        node.name
                    ))
                })?,
            };
            resolved.push((source, index, target, relationship.kind));
        }
    }

    for (source, index, target, kind) in resolved {
        model.node_mut(source).relationships[index].target = RelationshipTarget::Node(target);
        model.node_mut(target).incoming.push(BackLink { source, kind });
    }
    Ok(())
}

/// Computes hosting data and promotes connections to containers.
///
/// # Errors
///
/// Returns a parsing error if a software component has no host, if its
/// hosting chain does not end on a container, or if hosting is cyclic.
pub fn extend(model: &mut TopologyModel) -> Result<()> {
    let graph = HostingGraph::from_model(model);
    graph.validate(model)?;

    let software: Vec<NodeId> = model.software().map(|s| s.id).collect();
    for id in &software {
        let container = owning_container(model, &graph, *id)?;
        if let NodeKind::Software(sw) = &mut model.node_mut(*id).kind {
            sw.host_container = Some(container);
        }
        if let Some(c) = model.container_mut(container) {
            c.hosted.push(*id);
        }
        tracing::debug!(
            software = %model.node(*id).name,
            container = %model.node(container).name,
            "software hosted"
        );
    }

    // Every software reached through a connection answers on its host
    // container under its own name.
    let mut aliases = Vec::new();
    let mut promotions = Vec::new();
    for (source, node) in model.nodes() {
        for (index, relationship) in node.relationships.iter().enumerate() {
            if relationship.kind != RelationshipKind::ConnectsTo {
                continue;
            }
            let Some(target) = relationship.target_id() else {
                continue;
            };
            let target_node = model.node(target);
            let Some(host) = target_node.as_software().and_then(|s| s.host_container) else {
                continue;
            };
            aliases.push((host, target_node.name.clone()));
            if node.as_container().is_some() {
                promotions.push((source, index, host, target_node.name.clone()));
            }
        }
    }

    for (host, alias) in aliases {
        if let Some(c) = model.container_mut(host) {
            let _ = c.aliases.insert(alias);
        }
    }
    for (source, index, host, alias) in promotions {
        let relationship = &mut model.node_mut(source).relationships[index];
        relationship.target = RelationshipTarget::Node(host);
        relationship.alias = Some(alias);
    }
    Ok(())
}

fn owning_container(
    model: &TopologyModel,
    graph: &HostingGraph,
    software: NodeId,
) -> Result<NodeId> {
    let name = &model.node(software).name;
    let mut current = software;
    for _ in 0..model.len() {
        let Some(host) = graph.host_of(current) else {
            tracing::error!(software = %name, "software component without a host requirement");
            return Err(ToskoseError::parsing(format!(
                "software component {name} must have the \"host\" requirement"
            )));
        };
        match model.node(host).kind {
            NodeKind::Container(_) => return Ok(host),
            NodeKind::Software(_) => current = host,
            NodeKind::Volume(_) => {
                return Err(ToskoseError::parsing(format!(
                    "software component {name} is hosted on a volume"
                )));
            }
        }
    }
    Err(ToskoseError::parsing(format!(
        "hosting chain of {name} does not reach a container"
    )))
}
