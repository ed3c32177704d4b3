//! Build-context assembly.
//!
//! Layout of the context of a container hosting software components:
//!
//! ```text
//! <ctx>/
//!   <software>/
//!     artifacts/   every declared artifact, by basename
//!     scripts/     every lifecycle script, by basename
//!     logs/        <software>.log placeholder
//!   supervisord.conf
//! ```
//!
//! The manager context only holds the completed deployment configuration
//! and the manifest.

use std::path::{Path, PathBuf};

use toskose_common::constants::SUPERVISORD_CONFIG_NAME;
use toskose_common::error::{Result, ToskoseError};
use toskose_tosca::model::{ContainerRef, SoftwareRef, TopologyModel};

use crate::supervisord::SupervisionConfig;

/// A populated build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Context root directory.
    pub root: PathBuf,
    /// Container the context belongs to.
    pub container: String,
    /// Software subtrees created, in hosting order.
    pub software: Vec<String>,
    /// Generated supervisord configuration, absent for the manager.
    pub supervisord_config: Option<PathBuf>,
}

/// Materializes build contexts for the containers of one model.
#[derive(Debug)]
pub struct BuildContextAssembler<'a> {
    model: &'a TopologyModel,
    config_path: Option<&'a Path>,
}

impl<'a> BuildContextAssembler<'a> {
    /// Creates an assembler over a resolved model.
    #[must_use]
    pub const fn new(model: &'a TopologyModel) -> Self {
        Self {
            model,
            config_path: None,
        }
    }

    /// Sets the completed deployment configuration copied into the manager context.
    #[must_use]
    pub const fn with_config(mut self, config_path: &'a Path) -> Self {
        self.config_path = Some(config_path);
        self
    }

    /// Populates `dir` with the context of `container`.
    ///
    /// `launch_command` is only used for containers hosting nothing.
    ///
    /// # Errors
    ///
    /// Returns a fatal error on any filesystem failure, and a validation
    /// error if a standalone container has no launch command.
    pub fn assemble(
        &self,
        container: ContainerRef<'_>,
        dir: &Path,
        launch_command: Option<&str>,
    ) -> Result<BuildContext> {
        create_dir(dir)?;
        let name = container.node.name.clone();
        tracing::debug!(container = %name, dir = %dir.display(), "assembling build context");

        if container.container.is_manager() {
            self.assemble_manager(dir)?;
            return Ok(BuildContext {
                root: dir.to_path_buf(),
                container: name,
                software: Vec::new(),
                supervisord_config: None,
            });
        }

        let hosted = self.model.hosted_software(container.id);
        for software in &hosted {
            assemble_software(software, dir)?;
        }
        let config = if hosted.is_empty() {
            SupervisionConfig::standalone(&name, launch_command)?
        } else {
            SupervisionConfig::hosted(&hosted)?
        };
        let config_path = config.write_to(dir)?;
        validate(dir)?;

        tracing::info!(container = %name, software = hosted.len(), "build context assembled");
        Ok(BuildContext {
            root: dir.to_path_buf(),
            container: name,
            software: hosted.iter().map(|s| s.node.name.clone()).collect(),
            supervisord_config: Some(config_path),
        })
    }

    fn assemble_manager(&self, dir: &Path) -> Result<()> {
        let Some(config) = self.config_path else {
            return Err(ToskoseError::fatal(
                "the manager context needs the completed configuration",
            ));
        };
        copy_by_basename(config, dir)?;
        copy_by_basename(&self.model.manifest_path, dir)?;
        tracing::debug!(dir = %dir.display(), "manager context assembled");
        Ok(())
    }
}

fn assemble_software(software: &SoftwareRef<'_>, ctx: &Path) -> Result<()> {
    let name = &software.node.name;
    let root = ctx.join(name);

    let artifacts = root.join("artifacts");
    create_dir(&artifacts)?;
    for artifact in &software.software.artifacts {
        copy_by_basename(&artifact.path, &artifacts)?;
    }

    let scripts = root.join("scripts");
    create_dir(&scripts)?;
    for interface in &software.software.interfaces {
        copy_by_basename(&interface.command.path, &scripts)?;
    }

    let logs = root.join("logs");
    create_dir(&logs)?;
    let placeholder = logs.join(format!("{name}.log"));
    std::fs::write(&placeholder, format!("# {name} log\n"))
        .map_err(|e| ToskoseError::fatal_io(&placeholder, &e))?;

    tracing::debug!(software = %name, "software subtree assembled");
    Ok(())
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ToskoseError::fatal_io(dir, &e))
}

fn copy_by_basename(source: &Path, dir: &Path) -> Result<()> {
    let Some(basename) = source.file_name() else {
        return Err(ToskoseError::fatal(format!(
            "{} has no file name",
            source.display()
        )));
    };
    let target = dir.join(basename);
    let _ = std::fs::copy(source, &target).map_err(|e| ToskoseError::fatal_io(source, &e))?;
    Ok(())
}

/// Checks that a context holds a non-empty supervisord configuration.
fn validate(dir: &Path) -> Result<()> {
    let config = dir.join(SUPERVISORD_CONFIG_NAME);
    let len = std::fs::metadata(&config)
        .map_err(|e| ToskoseError::fatal_io(&config, &e))?
        .len();
    if len == 0 {
        tracing::error!(path = %config.display(), "empty supervisord configuration");
        return Err(ToskoseError::fatal(format!(
            "invalid context: {} is empty",
            config.display()
        )));
    }
    Ok(())
}
