//! Merges a resolved configuration into the topology model.

use toskose_common::config::{DockerSettings, ResolvedConfig};
use toskose_common::constants;
use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::{ContainerRole, ImageReference};
use toskose_tosca::decode::CONTAINER_TYPE;
use toskose_tosca::model::{
    BuiltImage, ContainerNode, NodeId, NodeKind, PortMapping, TopologyModel, TopologyNode,
};

struct Scheduled {
    id: NodeId,
    name: String,
    inputs: Vec<(String, String)>,
    hosts_software: bool,
}

fn built_image(docker: &DockerSettings) -> BuiltImage {
    BuiltImage {
        image: ImageReference::new(&docker.name, &docker.tag),
        registry_password: docker.registry_password.clone(),
        base_name: docker.base_name.clone(),
        base_tag: docker.base_tag.clone(),
    }
}

/// Applies `config` to `model` and appends the manager container.
///
/// Containers hosting software (and, when `standalone` is set, the others
/// too) are scheduled for toskosing with their supervisor environment, the
/// `INPUT_*` entries of their hosted components, and their built image.
/// Remaining containers pass through with their source image.
///
/// # Errors
///
/// Returns a partial validation error if a toskosed container has no
/// settings, and a parsing error if the manager name is already taken.
pub fn toskose_model(
    model: &mut TopologyModel,
    config: &ResolvedConfig,
    standalone: bool,
) -> Result<()> {
    let plan: Vec<Scheduled> = model
        .containers()
        .map(|c| Scheduled {
            id: c.id,
            name: c.node.name.clone(),
            inputs: model
                .hosted_software(c.id)
                .iter()
                .flat_map(|s| s.software.input_env(&s.node.name))
                .collect(),
            hosts_software: c.container.hosts_software(),
        })
        .collect();

    for Scheduled {
        id,
        name,
        inputs,
        hosts_software,
    } in plan
    {
        let settings = if hosts_software || standalone {
            Some(config.nodes.get(&name).ok_or_else(|| ToskoseError::PartialValidation {
                message: format!("no configuration for node {name}"),
            })?)
        } else {
            None
        };
        let Some(container) = model.container_mut(id) else {
            continue;
        };

        let Some(settings) = settings else {
            tracing::info!(container = %name, "no hosted software, passing through");
            container.built_image = container.source_image.clone().map(|image| BuiltImage {
                image,
                registry_password: None,
                base_name: None,
                base_tag: None,
            });
            container.hostname = Some(name);
            continue;
        };

        for (key, value) in settings.supervisor_env().into_iter().chain(inputs) {
            match container.env.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => container.env.push((key, value)),
            }
        }
        container.built_image = Some(built_image(&settings.docker));
        container.hostname = Some(settings.alias.clone());
        let _ = container.aliases.insert(settings.alias.clone());
        container.toskosed = true;
        tracing::debug!(
            container = %name,
            image = %settings.docker.name,
            "container scheduled for toskosing"
        );
    }

    let manager = &config.manager;
    let mut def = ContainerNode::new(None);
    def.role = ContainerRole::Manager;
    def.built_image = Some(built_image(&manager.docker));
    def.ports.push(PortMapping {
        host: manager.http_port,
        container: manager.http_port,
    });
    def.env = manager.manager_env();
    def.hostname = Some(manager.alias.clone());
    let _ = def.aliases.insert(manager.alias.clone());
    def.toskosed = true;
    let _ = model.push(TopologyNode::new(
        constants::DEFAULT_MANAGER_NAME,
        CONTAINER_TYPE,
        NodeKind::Container(def),
    ))?;
    tracing::info!(app = %model.name, "manager appended to the topology");
    Ok(())
}
