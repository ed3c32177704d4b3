//! The toskosing driver.
//!
//! One [`Toskoserizator::build`] call validates and unpacks an archive,
//! builds the topology model, resolves the configuration, assembles every
//! build context, toskoses every image (one container at a time), and
//! finally writes the deployment descriptor. The first failure ends the run;
//! images built before it are kept.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use toskose_common::config::{ResolvedConfig, ToskoseSettings};
use toskose_common::constants;
use toskose_common::error::{Result, ToskoseError};
use toskose_compose::generator::DescriptorGenerator;
use toskose_context::assembler::BuildContextAssembler;
use toskose_image::builder::{BuildPolicy, ImageBuilder, ToskosingRequest};
use toskose_image::engine::ContainerEngine;
use toskose_image::prompt::{ConfirmationProvider, CredentialProvider};
use toskose_tosca::archive;
use toskose_tosca::builder::TopologyModelBuilder;
use toskose_tosca::model::{NodeId, TopologyModel};

use crate::resolver::ConfigurationResolver;
use crate::updater;

/// Runs the whole toskosing pipeline against one container engine.
pub struct Toskoserizator<'a> {
    engine: &'a dyn ContainerEngine,
    credentials: &'a dyn CredentialProvider,
    confirmation: &'a dyn ConfirmationProvider,
    settings: ToskoseSettings,
}

impl std::fmt::Debug for Toskoserizator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toskoserizator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> Toskoserizator<'a> {
    /// Creates a driver.
    #[must_use]
    pub fn new(
        engine: &'a dyn ContainerEngine,
        credentials: &'a dyn CredentialProvider,
        confirmation: &'a dyn ConfirmationProvider,
        settings: ToskoseSettings,
    ) -> Self {
        Self {
            engine,
            credentials,
            confirmation,
            settings,
        }
    }

    /// Toskoses the application packaged in `archive`.
    ///
    /// `config` is an optional deployment configuration; `output` the
    /// directory receiving the descriptor (`./toskose_out` when omitted).
    /// The engine connection is closed on every exit path.
    ///
    /// Returns the path of the written descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first domain error raised by any stage.
    pub fn build(
        &self,
        archive: &Path,
        config: Option<&Path>,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        let app = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let span = tracing::info_span!("toskose", app = %app);
        let _guard = span.enter();

        let result = self.run(archive, config, output);
        self.engine.close();
        match &result {
            Ok(path) => tracing::info!(descriptor = %path.display(), "toskosing completed"),
            Err(e) => tracing::error!(error = %e, "toskosing failed"),
        }
        result
    }

    fn run(
        &self,
        archive_path: &Path,
        config: Option<&Path>,
        output: Option<&Path>,
    ) -> Result<PathBuf> {
        if let Some(config) = config {
            if !config.is_file() {
                return Err(ToskoseError::validation(format!(
                    "the configuration file {} does not exist",
                    config.display()
                )));
            }
        }
        let output = output_dir(output)?;
        let metadata = archive::validate(archive_path)?;

        let csar_dir = scratch_dir()?;
        let context_dir = scratch_dir()?;
        let manifest = archive::unpack(archive_path, &metadata, csar_dir.path())?;

        let mut model = TopologyModelBuilder::new().build(&manifest)?;
        let resolved = ConfigurationResolver::new(self.settings.toskose_standalone)
            .resolve(config, &model)?;
        updater::toskose_model(&mut model, &resolved, self.settings.toskose_standalone)?;

        let mut builder = ImageBuilder::new(
            self.engine,
            self.credentials,
            self.confirmation,
            BuildPolicy {
                enable_push: self.settings.enable_push,
                auth_attempts: self.settings.auth_attempts,
                push_attempts: self.settings.push_attempts,
            },
        );
        let toskosed: Vec<NodeId> = model
            .containers()
            .filter(|c| c.container.toskosed)
            .map(|c| c.id)
            .collect();
        for id in toskosed {
            toskose_container(&model, id, &resolved, context_dir.path(), &mut builder)?;
        }

        DescriptorGenerator::new(&self.settings.compose_version)?
            .generate(&model)?
            .write_to(&output, &self.settings.compose_file_name)
    }
}

fn toskose_container(
    model: &TopologyModel,
    id: NodeId,
    config: &ResolvedConfig,
    context_root: &Path,
    builder: &mut ImageBuilder<'_>,
) -> Result<()> {
    let node = model.node(id);
    let Some(container) = node.as_container() else {
        return Ok(());
    };
    let Some(built) = container.built_image.as_ref() else {
        return Err(ToskoseError::fatal(format!(
            "container {} has no destination image",
            node.name
        )));
    };
    tracing::info!(container = %node.name, role = %container.role, "toskosing container");

    let launch_command = if container.is_manager() || container.hosts_software() {
        None
    } else {
        match (&container.command, &container.source_image) {
            (Some(command), _) => Some(command.clone()),
            (None, Some(source)) => Some(builder.launch_command(source)?),
            (None, None) => None,
        }
    };

    let Some(container_ref) = model.container(&node.name) else {
        return Ok(());
    };
    let dir = context_root.join(&model.name).join(&node.name);
    let _ = BuildContextAssembler::new(model)
        .with_config(&config.path)
        .assemble(container_ref, &dir, launch_command.as_deref())?;

    let _ = builder.toskose(&ToskosingRequest {
        app_name: &model.name,
        role: container.role,
        source: container.source_image.as_ref(),
        destination: &built.image,
        base_name: built.base_name.as_deref(),
        base_tag: built.base_tag.as_deref(),
        registry_password: built.registry_password.as_deref(),
        context: &dir,
    })?;
    Ok(())
}

fn scratch_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| {
        tracing::error!(error = %e, "cannot create a temporary directory");
        ToskoseError::fatal("failed to create a temporary directory")
    })
}

fn output_dir(output: Option<&Path>) -> Result<PathBuf> {
    if let Some(output) = output {
        if !output.is_dir() {
            return Err(ToskoseError::validation(format!(
                "the output path {} does not exist",
                output.display()
            )));
        }
        return Ok(output.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| ToskoseError::fatal_io(Path::new("."), &e))?;
    let default = cwd.join(constants::DEFAULT_OUTPUT_PATH);
    std::fs::create_dir_all(&default).map_err(|e| ToskoseError::fatal_io(&default, &e))?;
    tracing::info!(path = %default.display(), "default output directory created");
    Ok(default)
}
