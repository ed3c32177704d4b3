//! Decoding of resolved node templates into [`TopologyNode`] variants.

use std::collections::{BTreeMap, BTreeSet};

use toskose_common::constants::DOCKER_HUB_REGISTRY;
use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::ImageReference;

use crate::manifest::{Manifest, RawNode, RawRequirement};
use crate::model::{
    ContainerNode, FileArtifact, LifecycleInput, LifecycleInterface, NodeKind, PortMapping,
    Relationship, RelationshipKind, RelationshipTarget, SoftwareNode, TopologyNode, VolumeNode,
};
use crate::value::{Scalar, ValueTree};

/// Base node type of containers.
pub const CONTAINER_TYPE: &str = "tosker.nodes.Container";
/// Base node type of software components.
pub const SOFTWARE_TYPE: &str = "tosker.nodes.Software";
/// Base node type of volumes.
pub const VOLUME_TYPE: &str = "tosker.nodes.Volume";

const IMAGE_ARTIFACT: &str = "tosker.artifacts.Image";
const IMAGE_SERVICE_ARTIFACT: &str = "tosker.artifacts.Image.Service";
const DOCKERFILE_ARTIFACT: &str = "tosker.artifacts.Dockerfile";
const DOCKERFILE_SERVICE_ARTIFACT: &str = "tosker.artifacts.Dockerfile.Service";

/// Maximum length of a `derived_from` chain.
const MAX_TYPE_CHAIN: usize = 64;

/// The three node families a declared type can derive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    /// `tosker.nodes.Container`
    Container,
    /// `tosker.nodes.Software`
    Software,
    /// `tosker.nodes.Volume`
    Volume,
}

/// Follows `derived_from` links until a base type is met.
///
/// Returns `None` for unknown types and for looping chains.
#[must_use]
pub fn base_type(
    type_name: &str,
    node_types: &BTreeMap<String, Option<String>>,
) -> Option<BaseType> {
    let mut seen = BTreeSet::new();
    let mut current = type_name;
    for _ in 0..MAX_TYPE_CHAIN {
        match current {
            CONTAINER_TYPE => return Some(BaseType::Container),
            SOFTWARE_TYPE => return Some(BaseType::Software),
            VOLUME_TYPE => return Some(BaseType::Volume),
            _ => {}
        }
        if !seen.insert(current) {
            return None;
        }
        current = node_types.get(current)?.as_deref()?;
    }
    None
}

/// Decodes one resolved node template.
///
/// # Errors
///
/// Returns a parsing error for unsupported types and for malformed
/// artifact, property, interface, or requirement blocks.
pub fn decode_node(raw: &RawNode, manifest: &Manifest) -> Result<TopologyNode> {
    let Some(base) = base_type(&raw.type_name, &manifest.node_types) else {
        tracing::error!(node = %raw.name, node_type = %raw.type_name, "node type not supported");
        return Err(ToskoseError::parsing(format!(
            "node type {} of node {} is not supported",
            raw.type_name, raw.name
        )));
    };
    tracing::debug!(node = %raw.name, node_type = %raw.type_name, "decoding node");

    let kind = match base {
        BaseType::Container => NodeKind::Container(decode_container(raw, manifest)?),
        BaseType::Software => NodeKind::Software(decode_software(raw, manifest)?),
        BaseType::Volume => NodeKind::Volume(decode_volume(raw)?),
    };

    let mut node = TopologyNode::new(raw.name.clone(), raw.type_name.clone(), kind);
    node.properties = raw.properties.clone();
    node.relationships = raw
        .requirements
        .iter()
        .map(|r| decode_requirement(&raw.name, r))
        .collect::<Result<_>>()?;
    Ok(node)
}

fn map_section<'a>(
    node: &str,
    section: &str,
    tree: &'a ValueTree,
) -> Result<&'a [(String, ValueTree)]> {
    match tree {
        ValueTree::Scalar(Scalar::Null) => Ok(&[]),
        ValueTree::Map(entries) => Ok(entries),
        _ => {
            tracing::error!(node = %node, section = %section, "section must be a map");
            Err(ToskoseError::parsing(format!(
                "{section} of node {node} is invalid, only a map is allowed"
            )))
        }
    }
}

fn decode_container(raw: &RawNode, manifest: &Manifest) -> Result<ContainerNode> {
    let artifacts = map_section(&raw.name, "artifacts", &raw.artifacts)?;
    if artifacts.len() > 1 {
        return Err(ToskoseError::parsing(format!(
            "container {} declares more than one docker artifact",
            raw.name
        )));
    }
    let source_image = artifacts
        .first()
        .map(|(_, artifact)| decode_docker_artifact(&raw.name, artifact, manifest))
        .transpose()?;

    let mut container = ContainerNode::new(source_image);
    for (key, value) in map_section(&raw.name, "properties", &raw.properties)? {
        match key.as_str() {
            "env_variable" => container.env = text_pairs(&raw.name, key, value)?,
            "command" => container.command = decode_command(value),
            "ports" => container.ports = decode_ports(&raw.name, value)?,
            "share_data" => container.share_data = text_list(value),
            _ => tracing::debug!(node = %raw.name, property = %key, "ignoring property"),
        }
    }
    Ok(container)
}

fn decode_docker_artifact(
    node: &str,
    artifact: &ValueTree,
    manifest: &Manifest,
) -> Result<ImageReference> {
    let fail = |reason: &str| {
        tracing::error!(node = %node, reason = %reason, "failed to parse the docker artifact");
        ToskoseError::parsing(format!("invalid docker artifact on node {node}: {reason}"))
    };
    if artifact.as_map().is_none() {
        return Err(fail("only a map is allowed"));
    }
    let file = artifact
        .get("file")
        .and_then(ValueTree::as_text)
        .ok_or_else(|| fail("missing the \"file\" field"))?;
    let artifact_type = artifact
        .get("type")
        .and_then(ValueTree::as_text)
        .ok_or_else(|| fail("missing the \"type\" field"))?;
    let repository = artifact
        .get("repository")
        .and_then(ValueTree::as_text)
        .ok_or_else(|| fail("missing the \"repository\" field"))?;

    match artifact_type.as_str() {
        IMAGE_ARTIFACT | IMAGE_SERVICE_ARTIFACT => {}
        DOCKERFILE_ARTIFACT | DOCKERFILE_SERVICE_ARTIFACT => {
            return Err(fail("Dockerfile artifacts are not supported"));
        }
        _ => return Err(fail("unknown artifact type")),
    }

    let url = manifest
        .repositories
        .get(&repository)
        .ok_or_else(|| fail("unknown repository"))?;
    let registry = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_matches('/');

    let image = ImageReference::parse(&file).map_err(|_| fail("malformed image reference"))?;
    if registry == DOCKER_HUB_REGISTRY {
        Ok(image)
    } else {
        Ok(image.with_registry(registry))
    }
}

fn decode_command(value: &ValueTree) -> Option<String> {
    match value {
        ValueTree::Sequence(items) => {
            let parts: Vec<String> = items.iter().filter_map(ValueTree::as_text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        other => other.as_text().filter(|c| !c.trim().is_empty()),
    }
}

fn decode_ports(node: &str, value: &ValueTree) -> Result<Vec<PortMapping>> {
    let port = |text: Option<String>| -> Result<u16> {
        text.and_then(|t| t.trim().parse::<u16>().ok())
            .filter(|p| *p != 0)
            .ok_or_else(|| ToskoseError::parsing(format!("invalid port on node {node}")))
    };
    map_section(node, "ports", value)?
        .iter()
        .map(|(host, container)| {
            Ok(PortMapping {
                host: port(Some(host.clone()))?,
                container: port(container.as_text())?,
            })
        })
        .collect()
}

fn text_pairs(node: &str, section: &str, value: &ValueTree) -> Result<Vec<(String, String)>> {
    Ok(map_section(node, section, value)?
        .iter()
        .map(|(k, v)| (k.clone(), v.as_text().unwrap_or_default()))
        .collect())
}

fn text_list(value: &ValueTree) -> Vec<String> {
    match value {
        ValueTree::Sequence(items) => items.iter().filter_map(ValueTree::as_text).collect(),
        other => other.as_text().into_iter().collect(),
    }
}

fn decode_software(raw: &RawNode, manifest: &Manifest) -> Result<SoftwareNode> {
    let mut software = SoftwareNode::default();

    for (name, value) in map_section(&raw.name, "artifacts", &raw.artifacts)? {
        let artifact = file_of(value, manifest)?.ok_or_else(|| {
            ToskoseError::parsing(format!("artifact {name} of node {} has no path", raw.name))
        })?;
        software.artifacts.push(FileArtifact {
            name: Some(name.clone()),
            path: artifact.path,
        });
    }

    for (group, operations) in map_section(&raw.name, "interfaces", &raw.interfaces)? {
        for (operation, definition) in map_section(&raw.name, group, operations)? {
            let implementation = match definition {
                ValueTree::Map(_) => definition.get("implementation"),
                other => Some(other),
            };
            let command = match implementation {
                Some(implementation) => file_of(implementation, manifest)?,
                None => None,
            };
            let Some(command) = command else {
                tracing::warn!(
                    node = %raw.name,
                    operation = %operation,
                    "operation without implementation, skipping"
                );
                continue;
            };
            let mut inputs = Vec::new();
            if let Some(declared) = definition.get("inputs") {
                for (input, value) in map_section(&raw.name, "inputs", declared)? {
                    let input_value = match value {
                        ValueTree::File(file) => LifecycleInput::FileRef(file.clone()),
                        other => LifecycleInput::Literal(other.as_text().unwrap_or_default()),
                    };
                    inputs.push((input.clone(), input_value));
                }
            }
            software.interfaces.push(LifecycleInterface {
                group: group.clone(),
                operation: operation.clone(),
                command,
                inputs,
            });
        }
    }
    Ok(software)
}

fn file_of(value: &ValueTree, manifest: &Manifest) -> Result<Option<FileArtifact>> {
    let relative = match value {
        ValueTree::File(file) => return Ok(Some(file.clone())),
        ValueTree::Map(_) => value.get("file").and_then(ValueTree::as_text),
        other => other.as_text(),
    };
    relative
        .map(|p| FileArtifact::rebased(None, &manifest.base_dir, &p))
        .transpose()
}

fn decode_volume(raw: &RawNode) -> Result<VolumeNode> {
    let driver_opts = match raw.properties.get("driver_opt") {
        Some(opts) => text_pairs(&raw.name, "driver_opt", opts)?,
        None => Vec::new(),
    };
    Ok(VolumeNode { driver_opts })
}

fn decode_requirement(node: &str, requirement: &RawRequirement) -> Result<Relationship> {
    let explicit = requirement.relationship_type.as_deref().and_then(|t| {
        match t.rsplit('.').next() {
            Some("HostedOn") => Some(RelationshipKind::HostedOn),
            Some("ConnectsTo") => Some(RelationshipKind::ConnectsTo),
            Some("DependsOn") => Some(RelationshipKind::DependsOn),
            Some("AttachesTo") => Some(RelationshipKind::AttachesTo),
            _ => None,
        }
    });
    let by_name = match requirement.name.as_str() {
        "host" => Some(RelationshipKind::HostedOn),
        "connection" => Some(RelationshipKind::ConnectsTo),
        "dependency" => Some(RelationshipKind::DependsOn),
        "storage" => Some(RelationshipKind::AttachesTo),
        _ => None,
    };
    let Some(kind) = explicit.or(by_name) else {
        tracing::error!(node = %node, requirement = %requirement.name, "unknown requirement");
        return Err(ToskoseError::parsing(format!(
            "requirement {} of node {node} has an unknown relationship",
            requirement.name
        )));
    };
    if kind == RelationshipKind::AttachesTo && requirement.location.is_none() {
        return Err(ToskoseError::parsing(format!(
            "storage requirement of node {node} has no location"
        )));
    }
    Ok(Relationship {
        requirement: requirement.name.clone(),
        kind,
        target: RelationshipTarget::Name(requirement.node.clone()),
        alias: None,
        location: requirement.location.clone(),
    })
}
