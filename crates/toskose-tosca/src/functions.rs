//! Resolution of `get_input`, `get_property`, and `get_artifact`.
//!
//! Every lookup reads a snapshot of the raw node data taken before the walk
//! starts, so the order in which nodes are rewritten never changes a result.
//! Chains of `get_property` calls are followed; a chain that revisits a
//! `(node, call)` pair or grows past [`MAX_RESOLUTION_DEPTH`] is a parsing error.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use toskose_common::error::{Result, ToskoseError};

use crate::manifest::Manifest;
use crate::model::FileArtifact;
use crate::value::{FunctionCall, FunctionKind, TreeVisitor, ValueTree};

/// Maximum length of a chain of nested function resolutions.
pub const MAX_RESOLUTION_DEPTH: usize = 32;

#[derive(Debug, Clone)]
struct NodeSnapshot {
    properties: ValueTree,
    artifacts: ValueTree,
}

/// Resolves function calls against topology inputs and node data.
#[derive(Debug)]
pub struct FunctionResolver {
    overrides: BTreeMap<String, ValueTree>,
    defaults: BTreeMap<String, ValueTree>,
    snapshot: HashMap<String, NodeSnapshot>,
    base_dir: PathBuf,
    current: String,
    chain: Vec<(String, FunctionCall)>,
}

impl FunctionResolver {
    /// Creates a resolver over a snapshot of `manifest`.
    #[must_use]
    pub fn new(manifest: &Manifest, overrides: BTreeMap<String, ValueTree>) -> Self {
        let defaults = manifest
            .inputs
            .iter()
            .filter_map(|i| i.default.clone().map(|d| (i.name.clone(), d)))
            .collect();
        let snapshot = manifest
            .nodes
            .iter()
            .map(|n| {
                (
                    n.name.clone(),
                    NodeSnapshot {
                        properties: n.properties.clone(),
                        artifacts: n.artifacts.clone(),
                    },
                )
            })
            .collect();
        Self {
            overrides,
            defaults,
            snapshot,
            base_dir: manifest.base_dir.clone(),
            current: String::new(),
            chain: Vec::new(),
        }
    }

    /// Rewrites every function call of the manifest in place.
    ///
    /// Returns the number of substitutions performed. Running it again on
    /// an already resolved manifest performs none.
    ///
    /// # Errors
    ///
    /// Returns a parsing error for unknown inputs, nodes, properties, or
    /// artifacts, and for cyclic or too deep resolution chains.
    pub fn resolve_manifest(&mut self, manifest: &mut Manifest) -> Result<usize> {
        let mut count = 0;
        for node in &mut manifest.nodes {
            self.current.clone_from(&node.name);
            count += node.properties.accept(self)?;
            count += node.artifacts.accept(self)?;
            count += node.interfaces.accept(self)?;
        }
        for (name, output) in &mut manifest.outputs {
            self.current.clone_from(name);
            count += output.accept(self)?;
        }
        tracing::debug!(substitutions = count, "functions resolved");
        Ok(count)
    }

    fn resolve(&mut self, call: &FunctionCall) -> Result<ValueTree> {
        match call.kind {
            FunctionKind::GetInput => self.input(call),
            FunctionKind::GetProperty => self.property(call),
            FunctionKind::GetArtifact => self.artifact(call),
        }
    }

    fn input(&mut self, call: &FunctionCall) -> Result<ValueTree> {
        let name = &call.args[0];
        let value = self
            .overrides
            .get(name)
            .or_else(|| self.defaults.get(name))
            .cloned()
            .ok_or_else(|| {
                tracing::error!(input = %name, node = %self.current, "unknown input");
                ToskoseError::parsing(format!("input {name} has no value and no default"))
            })?;
        self.follow(call, self.current.clone(), value)
    }

    fn property(&mut self, call: &FunctionCall) -> Result<ValueTree> {
        let target = self.target(&call.args[0]);
        let value = self
            .node(&target)?
            .properties
            .path(&call.args[1..])
            .cloned()
            .ok_or_else(|| {
                tracing::error!(node = %target, call = %call, "property not found");
                ToskoseError::parsing(format!(
                    "property {} not found on node {target}",
                    call.args[1..].join(".")
                ))
            })?;
        self.follow(call, target, value)
    }

    fn artifact(&mut self, call: &FunctionCall) -> Result<ValueTree> {
        let target = self.target(&call.args[0]);
        let artifact = self
            .node(&target)?
            .artifacts
            .get(&call.args[1])
            .cloned()
            .ok_or_else(|| {
                tracing::error!(node = %target, call = %call, "artifact not found");
                ToskoseError::parsing(format!(
                    "artifact {} not found on node {target}",
                    call.args[1]
                ))
            })?;
        let artifact = self.follow(call, target, artifact)?;
        let relative = match &artifact {
            ValueTree::File(file) => return Ok(ValueTree::File(file.clone())),
            ValueTree::Map(_) => artifact.get("file").and_then(ValueTree::as_text),
            other => other.as_text(),
        }
        .ok_or_else(|| {
            ToskoseError::parsing(format!("artifact {} has no file path", call.args[1]))
        })?;
        Ok(ValueTree::File(FileArtifact::rebased(
            None,
            &self.base_dir,
            &relative,
        )?))
    }

    fn target(&self, name: &str) -> String {
        if name == "SELF" {
            self.current.clone()
        } else {
            name.to_string()
        }
    }

    fn node(&self, name: &str) -> Result<&NodeSnapshot> {
        self.snapshot.get(name).ok_or_else(|| {
            tracing::error!(
                node = %name,
                referenced_by = %self.current,
                "unknown node in function"
            );
            ToskoseError::parsing(format!("function refers to unknown node {name}"))
        })
    }

    /// Resolves the functions nested inside a looked-up value, with `target`
    /// as the `SELF` node.
    fn follow(
        &mut self,
        call: &FunctionCall,
        target: String,
        mut value: ValueTree,
    ) -> Result<ValueTree> {
        if !value.has_functions() {
            return Ok(value);
        }
        let key = (target.clone(), call.clone());
        if self.chain.contains(&key) {
            tracing::error!(node = %target, call = %call, "cyclic function resolution");
            return Err(ToskoseError::parsing(format!(
                "cyclic resolution of {call} on node {target}"
            )));
        }
        if self.chain.len() >= MAX_RESOLUTION_DEPTH {
            return Err(ToskoseError::parsing(format!(
                "function resolution deeper than {MAX_RESOLUTION_DEPTH} levels"
            )));
        }

        self.chain.push(key);
        let previous = std::mem::replace(&mut self.current, target);
        let outcome = value.accept(self);
        self.current = previous;
        let _ = self.chain.pop();
        let _ = outcome?;
        Ok(value)
    }
}

impl TreeVisitor for FunctionResolver {
    fn visit_function(&mut self, call: &FunctionCall) -> Result<ValueTree> {
        self.resolve(call)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::value::Scalar;

    fn manifest(nodes: &str) -> Manifest {
        let content = format!(
            "repositories:\n  hub: https://registry.hub.docker.com\ntopology_template:\n  inputs:\n    api_port:\n      default: 8000\n  node_templates:\n{nodes}"
        );
        Manifest::parse_str(&content, Path::new("/pkg/app.yaml"), Path::new("/pkg"))
            .expect("manifest")
    }

    fn text(s: &str) -> ValueTree {
        ValueTree::Scalar(Scalar::Text(s.into()))
    }

    #[test]
    fn get_input_prefers_overrides_over_defaults() {
        let mut m = manifest(
            "    maven:\n      type: tosker.nodes.Container\n      properties:\n        ports:\n          8080: { get_input: api_port }\n",
        );
        let overrides = BTreeMap::from([("api_port".to_string(), text("9999"))]);
        let _ = FunctionResolver::new(&m, overrides)
            .resolve_manifest(&mut m)
            .expect("resolve");
        let port = m.nodes[0].properties.path(&["ports", "8080"]).and_then(ValueTree::as_text);
        assert_eq!(port.as_deref(), Some("9999"));
    }

    #[test]
    fn get_input_falls_back_to_default() {
        let mut m = manifest(
            "    maven:\n      type: tosker.nodes.Container\n      properties:\n        ports:\n          8080: { get_input: api_port }\n",
        );
        let _ = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect("resolve");
        let port = m.nodes[0].properties.path(&["ports", "8080"]).and_then(ValueTree::as_text);
        assert_eq!(port.as_deref(), Some("8000"));
    }

    #[test]
    fn get_artifact_becomes_a_rebased_file() {
        let mut m = manifest(
            "    api:\n      type: tosker.nodes.Software\n      artifacts:\n        jar: artifacts/api.jar\n      interfaces:\n        Standard:\n          create:\n            implementation: scripts/create.sh\n            inputs:\n              jar: { get_artifact: [SELF, jar] }\n",
        );
        let _ = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect("resolve");
        let input = m.nodes[0].interfaces.path(&["Standard", "create", "inputs", "jar"]);
        assert_eq!(
            input,
            Some(&ValueTree::File(FileArtifact {
                name: None,
                path: PathBuf::from("/pkg/artifacts/api.jar"),
            }))
        );
    }

    #[test]
    fn get_artifact_outside_the_package_is_rejected() {
        let mut m = manifest(
            "    api:\n      type: tosker.nodes.Software\n      artifacts:\n        key: ../../root/.ssh/id_rsa\n      properties:\n        key: { get_artifact: [SELF, key] }\n",
        );
        let err = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect_err("escaping artifact");
        assert!(err.to_string().contains("escapes the package"));
    }

    #[test]
    fn get_property_chains_are_followed() {
        let mut m = manifest(
            "    a:\n      type: tosker.nodes.Software\n      properties:\n        repo: { get_property: [b, repo] }\n    b:\n      type: tosker.nodes.Software\n      properties:\n        repo: { get_input: api_port }\n",
        );
        let _ = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect("resolve");
        assert_eq!(
            m.nodes[0].properties.get("repo").and_then(ValueTree::as_text).as_deref(),
            Some("8000")
        );
    }

    #[test]
    fn self_referential_property_is_a_parsing_error() {
        let mut m = manifest(
            "    a:\n      type: tosker.nodes.Software\n      properties:\n        x: { get_property: [SELF, y] }\n        y: { get_property: [SELF, x] }\n",
        );
        let err = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect_err("cycle");
        assert!(matches!(err, ToskoseError::Parsing { .. }));
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn unknown_input_without_default_fails() {
        let mut m = manifest(
            "    a:\n      type: tosker.nodes.Software\n      properties:\n        x: { get_input: nope }\n",
        );
        assert!(FunctionResolver::new(&m, BTreeMap::new()).resolve_manifest(&mut m).is_err());
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut m = manifest(
            "    a:\n      type: tosker.nodes.Software\n      properties:\n        x: { get_input: api_port }\n        y: { get_property: [SELF, x] }\n",
        );
        let first = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect("first");
        assert_eq!(first, 2);
        let nodes = m.nodes.clone();
        let second = FunctionResolver::new(&m, BTreeMap::new())
            .resolve_manifest(&mut m)
            .expect("second");
        assert_eq!(second, 0);
        assert_eq!(m.nodes, nodes);
    }
}
