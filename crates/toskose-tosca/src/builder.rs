//! Entry point turning a manifest into a linked [`TopologyModel`].

use std::collections::BTreeMap;
use std::path::Path;

use toskose_common::error::Result;

use crate::decode::decode_node;
use crate::functions::FunctionResolver;
use crate::link;
use crate::manifest::Manifest;
use crate::model::TopologyModel;
use crate::value::{Scalar, ValueTree};

/// Builds a [`TopologyModel`] from an unpacked manifest.
///
/// The stages run in a fixed order: raw decoding, function resolution,
/// typed decoding, linking, and the hosting extension pass.
#[derive(Debug, Default)]
pub struct TopologyModelBuilder {
    inputs: BTreeMap<String, ValueTree>,
}

impl TopologyModelBuilder {
    /// Creates a builder without input overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the value of a topology input.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self
            .inputs
            .insert(name.into(), ValueTree::Scalar(Scalar::Text(value.into())));
        self
    }

    /// Builds the model of the manifest at `manifest_path`.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the manifest is missing or malformed, if a
    /// function cannot be resolved, or if the topology is not well formed.
    pub fn build(self, manifest_path: &Path) -> Result<TopologyModel> {
        let mut manifest = Manifest::load(manifest_path)?;
        tracing::debug!(
            app = %manifest.app_name(),
            base_dir = %manifest.base_dir.display(),
            "manifest loaded"
        );

        let _ = FunctionResolver::new(&manifest, self.inputs).resolve_manifest(&mut manifest)?;

        let mut model = TopologyModel::new(manifest.app_name(), manifest.base_dir.clone());
        model.description.clone_from(&manifest.description);
        model.manifest_path.clone_from(&manifest.path);
        model.imports.clone_from(&manifest.imports);

        for raw in &manifest.nodes {
            let _ = model.push(decode_node(raw, &manifest)?)?;
        }
        model.outputs = manifest.outputs;

        link::link(&mut model)?;
        link::extend(&mut model)?;

        tracing::info!(
            app = %model.name,
            nodes = model.len(),
            containers = model.containers().count(),
            software = model.software().count(),
            "topology model built"
        );
        Ok(model)
    }
}
