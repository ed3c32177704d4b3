//! Raw decoding of a TOSCA manifest and of its imported type files.
//!
//! The outer document shape is decoded with `serde`; free-form sections
//! (properties, artifacts, interfaces, outputs) are kept as [`ValueTree`]s
//! so declarative functions can be resolved before typed decoding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use toskose_common::error::{Result, ToskoseError};

use crate::value::ValueTree;

#[derive(Debug, Default, Deserialize)]
struct ManifestDoc {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    repositories: Option<Mapping>,
    #[serde(default)]
    imports: Option<Vec<Value>>,
    #[serde(default)]
    node_types: Option<Mapping>,
    #[serde(default)]
    topology_template: Option<TopologyDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct TopologyDoc {
    #[serde(default)]
    inputs: Option<Mapping>,
    #[serde(default)]
    node_templates: Option<Mapping>,
    #[serde(default)]
    outputs: Option<Mapping>,
}

#[derive(Debug, Default, Deserialize)]
struct TypesDoc {
    #[serde(default)]
    node_types: Option<Mapping>,
}

#[derive(Debug, Deserialize)]
struct NodeTemplateDoc {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    properties: Value,
    #[serde(default)]
    artifacts: Value,
    #[serde(default)]
    interfaces: Value,
    #[serde(default)]
    requirements: Vec<Mapping>,
}

/// A topology input declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDefinition {
    /// Input name.
    pub name: String,
    /// Declared default value.
    pub default: Option<ValueTree>,
}

/// A requirement as declared on a node template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequirement {
    /// Requirement name (`host`, `connection`, `dependency`, `storage`, ...).
    pub name: String,
    /// Target node name.
    pub node: String,
    /// Explicit `relationship.type`, if any.
    pub relationship_type: Option<String>,
    /// `relationship.properties.location`, if any.
    pub location: Option<String>,
}

/// A node template before typed decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    /// Node name.
    pub name: String,
    /// Declared type.
    pub type_name: String,
    /// `properties` section.
    pub properties: ValueTree,
    /// `artifacts` section.
    pub artifacts: ValueTree,
    /// `interfaces` section.
    pub interfaces: ValueTree,
    /// `requirements` section, in declaration order.
    pub requirements: Vec<RawRequirement>,
}

/// A decoded manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Path of the manifest file.
    pub path: PathBuf,
    /// Directory containing the manifest.
    pub base_dir: PathBuf,
    /// Free-form description.
    pub description: Option<String>,
    /// Repository name to URL.
    pub repositories: BTreeMap<String, String>,
    /// Local type imports, by namespace.
    pub imports: Vec<(String, PathBuf)>,
    /// Node type name to its `derived_from` parent, merged with imports.
    pub node_types: BTreeMap<String, Option<String>>,
    /// Topology inputs.
    pub inputs: Vec<InputDefinition>,
    /// Node templates, in declaration order.
    pub nodes: Vec<RawNode>,
    /// Topology outputs.
    pub outputs: Vec<(String, ValueTree)>,
}

impl Manifest {
    /// Reads and decodes a manifest file.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the file is not valid YAML, if the
    /// `repositories` or `topology_template` sections are missing, or if an
    /// import cannot be found. Returns a fatal error if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ToskoseError::parsing(format!(
                "manifest {} does not exist",
                path.display()
            )));
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ToskoseError::fatal_io(path, &e))?;
        let base_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::parse_str(&content, path, &base_dir)
    }

    /// Decodes manifest content rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// See [`Manifest::load`].
    pub fn parse_str(content: &str, path: &Path, base_dir: &Path) -> Result<Self> {
        let doc: ManifestDoc = serde_yaml::from_str(content).map_err(|e| {
            tracing::error!(manifest = %path.display(), error = %e, "malformed manifest");
            ToskoseError::parsing(format!("malformed manifest {}", path.display()))
        })?;

        let repositories = decode_repositories(doc.repositories.as_ref(), path)?;
        let Some(topology) = doc.topology_template else {
            tracing::error!(manifest = %path.display(), "no topology template found");
            return Err(ToskoseError::parsing(format!(
                "no topology_template found in {}",
                path.display()
            )));
        };

        let mut node_types = BTreeMap::new();
        merge_node_types(&mut node_types, doc.node_types.as_ref());

        let mut imports = Vec::new();
        for entry in doc.imports.unwrap_or_default() {
            let Some((namespace, file)) = import_entry(&entry) else {
                return Err(ToskoseError::parsing(format!(
                    "invalid import entry {entry:?}"
                )));
            };
            if file.starts_with("http://") || file.starts_with("https://") {
                tracing::warn!(import = %file, "remote imports are not supported, skipping");
                continue;
            }
            let import_path = base_dir.join(&file);
            let types = load_types(&import_path)?;
            merge_node_types(&mut node_types, types.node_types.as_ref());
            tracing::debug!(namespace = %namespace, path = %import_path.display(), "import added");
            imports.push((namespace, import_path));
        }

        let mut inputs = Vec::new();
        for (name, definition) in topology.inputs.iter().flatten() {
            let name = mapping_key(name)?;
            let default = definition
                .get("default")
                .map(ValueTree::from_yaml)
                .transpose()?;
            inputs.push(InputDefinition { name, default });
        }

        let mut nodes = Vec::new();
        for (name, template) in topology.node_templates.iter().flatten() {
            nodes.push(decode_node(mapping_key(name)?, template)?);
        }

        let mut outputs = Vec::new();
        for (name, output) in topology.outputs.iter().flatten() {
            outputs.push((mapping_key(name)?, ValueTree::from_yaml(output)?));
        }

        Ok(Self {
            path: path.to_path_buf(),
            base_dir: base_dir.to_path_buf(),
            description: doc.description,
            repositories,
            imports,
            node_types,
            inputs,
            nodes,
            outputs,
        })
    }

    /// Returns the application name (the manifest file stem).
    #[must_use]
    pub fn app_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns a node template by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&RawNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

fn decode_repositories(
    repositories: Option<&Mapping>,
    path: &Path,
) -> Result<BTreeMap<String, String>> {
    let Some(repositories) = repositories.filter(|r| !r.is_empty()) else {
        tracing::error!(manifest = %path.display(), "no repositories found");
        return Err(ToskoseError::parsing(format!(
            "no repositories found in {}",
            path.display()
        )));
    };
    let mut out = BTreeMap::new();
    for (name, value) in repositories {
        let url = match value {
            Value::String(url) => url.clone(),
            Value::Mapping(m) => m
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ToskoseError::parsing(format!("repository {name:?} has no url"))
                })?,
            other => {
                return Err(ToskoseError::parsing(format!(
                    "invalid repository definition {other:?}"
                )));
            }
        };
        let _ = out.insert(mapping_key(name)?, url);
    }
    Ok(out)
}

fn import_entry(entry: &Value) -> Option<(String, String)> {
    match entry {
        Value::String(file) => Some((file.clone(), file.clone())),
        Value::Mapping(m) if m.len() == 1 => {
            let (k, v) = m.iter().next()?;
            let file = match v {
                Value::String(f) => f.clone(),
                Value::Mapping(inner) => inner.get("file")?.as_str()?.to_string(),
                _ => return None,
            };
            Some((k.as_str()?.to_string(), file))
        }
        _ => None,
    }
}

fn load_types(path: &Path) -> Result<TypesDoc> {
    if !path.is_file() {
        tracing::error!(import = %path.display(), "imported file not found");
        return Err(ToskoseError::parsing(format!(
            "imported file {} not found",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path).map_err(|e| ToskoseError::fatal_io(path, &e))?;
    serde_yaml::from_str(&content).map_err(|e| {
        tracing::error!(import = %path.display(), error = %e, "malformed import");
        ToskoseError::parsing(format!("malformed import {}", path.display()))
    })
}

fn merge_node_types(into: &mut BTreeMap<String, Option<String>>, types: Option<&Mapping>) {
    for (name, definition) in types.into_iter().flatten() {
        if let Some(name) = name.as_str() {
            let parent = definition
                .get("derived_from")
                .and_then(Value::as_str)
                .map(str::to_string);
            let _ = into.insert(name.to_string(), parent);
        }
    }
}

fn mapping_key(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ToskoseError::parsing(format!("invalid key {other:?}"))),
    }
}

fn decode_node(name: String, template: &Value) -> Result<RawNode> {
    let doc: NodeTemplateDoc = serde_yaml::from_value(template.clone()).map_err(|e| {
        tracing::error!(node = %name, error = %e, "malformed node template");
        ToskoseError::parsing(format!("malformed node template {name}"))
    })?;

    let mut requirements = Vec::with_capacity(doc.requirements.len());
    for requirement in &doc.requirements {
        requirements.push(decode_requirement(&name, requirement)?);
    }

    Ok(RawNode {
        properties: ValueTree::from_yaml(&doc.properties)?,
        artifacts: ValueTree::from_yaml(&doc.artifacts)?,
        interfaces: ValueTree::from_yaml(&doc.interfaces)?,
        type_name: doc.type_name,
        requirements,
        name,
    })
}

fn decode_requirement(node: &str, requirement: &Mapping) -> Result<RawRequirement> {
    let invalid = || ToskoseError::parsing(format!("invalid requirement on node {node}"));
    if requirement.len() != 1 {
        return Err(invalid());
    }
    let (name, value) = requirement.iter().next().ok_or_else(invalid)?;
    let name = name.as_str().ok_or_else(invalid)?.to_string();

    match value {
        Value::String(target) => Ok(RawRequirement {
            name,
            node: target.clone(),
            relationship_type: None,
            location: None,
        }),
        Value::Mapping(m) => {
            let target = m.get("node").and_then(Value::as_str).ok_or_else(invalid)?;
            let relationship = m.get("relationship");
            let relationship_type = relationship
                .and_then(|r| r.as_str().or_else(|| r.get("type").and_then(Value::as_str)))
                .map(str::to_string);
            let location = relationship
                .and_then(|r| r.get("properties"))
                .and_then(|p| p.get("location"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(RawRequirement {
                name,
                node: target.to_string(),
                relationship_type,
                location,
            })
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
tosca_definitions_version: tosca_simple_yaml_1_0
description: demo
repositories:
  docker_hub: https://registry.hub.docker.com/
topology_template:
  inputs:
    api_port:
      type: integer
      default: 8000
  node_templates:
    api:
      type: tosker.nodes.Software
      requirements:
        - host: maven
        - storage:
            node: dbvolume
            relationship:
              type: tosca.relationships.AttachesTo
              properties:
                location: /data/db
    maven:
      type: tosker.nodes.Container
    dbvolume:
      type: tosker.nodes.Volume
  outputs:
    api_port:
      value: { get_input: api_port }
";

    fn parse(content: &str) -> Result<Manifest> {
        Manifest::parse_str(content, Path::new("/pkg/demo.yaml"), Path::new("/pkg"))
    }

    #[test]
    fn decodes_sections_in_declaration_order() {
        let manifest = parse(MINIMAL).expect("manifest");
        assert_eq!(manifest.app_name(), "demo");
        assert_eq!(manifest.description.as_deref(), Some("demo"));
        let names: Vec<_> = manifest.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["api", "maven", "dbvolume"]);
        assert_eq!(manifest.inputs.len(), 1);
        assert_eq!(manifest.outputs.len(), 1);
    }

    #[test]
    fn decodes_short_and_long_requirements() {
        let manifest = parse(MINIMAL).expect("manifest");
        let api = manifest.node("api").expect("api");
        assert_eq!(api.requirements[0].name, "host");
        assert_eq!(api.requirements[0].node, "maven");
        assert_eq!(api.requirements[1].location.as_deref(), Some("/data/db"));
        assert_eq!(
            api.requirements[1].relationship_type.as_deref(),
            Some("tosca.relationships.AttachesTo")
        );
    }

    #[test]
    fn missing_repositories_is_a_parsing_error() {
        let err = parse("topology_template:\n  node_templates: {}\n").expect_err("must fail");
        assert!(matches!(err, ToskoseError::Parsing { .. }));
    }

    #[test]
    fn missing_topology_template_is_a_parsing_error() {
        let err = parse("repositories:\n  hub: https://registry.hub.docker.com\n")
            .expect_err("must fail");
        assert!(matches!(err, ToskoseError::Parsing { .. }));
    }

    #[test]
    fn missing_local_import_is_a_parsing_error() {
        let content = format!("imports:\n  - tosker: missing-types.yaml\n{MINIMAL}");
        let err = parse(&content).expect_err("must fail");
        assert!(matches!(err, ToskoseError::Parsing { .. }));
    }

    #[test]
    fn remote_imports_are_skipped() {
        let content = format!("imports:\n  - tosker: https://example.org/types.yaml\n{MINIMAL}");
        let manifest = parse(&content).expect("manifest");
        assert!(manifest.imports.is_empty());
    }
}
