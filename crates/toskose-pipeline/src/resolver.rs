//! Deployment configuration resolution.
//!
//! A configuration goes through `load`, `validate`, and `complete`, then is
//! written next to the manifest and settled into a [`ResolvedConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use toskose_common::config::{
    DockerConfig, DockerSettings, ManagerConfig, ManagerSettings, NodeConfig, NodeSettings,
    ResolvedConfig, ToskoseConfig,
};
use toskose_common::constants;
use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::PortSequence;
use toskose_tosca::model::TopologyModel;

/// Loads, validates, and completes deployment configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationResolver {
    standalone: bool,
}

impl ConfigurationResolver {
    /// Creates a resolver; `standalone` also configures containers hosting nothing.
    #[must_use]
    pub const fn new(standalone: bool) -> Self {
        Self { standalone }
    }

    /// Names of the containers needing a `nodes` entry.
    fn toskosed_containers(self, model: &TopologyModel) -> Vec<String> {
        model
            .containers()
            .filter(|c| !c.container.is_manager())
            .filter(|c| self.standalone || c.container.hosts_software())
            .map(|c| c.node.name.clone())
            .collect()
    }

    /// Parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown fields, a parsing error for
    /// malformed YAML, and a fatal error if the file cannot be read.
    pub fn load(path: &Path) -> Result<ToskoseConfig> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ToskoseError::fatal_io(path, &e))?;
        if content.trim().is_empty() {
            return Ok(ToskoseConfig::default());
        }
        serde_yaml::from_str(&content).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "invalid configuration");
            if e.to_string().contains("unknown field") {
                ToskoseError::validation(format!("{} contains unknown fields", path.display()))
            } else {
                ToskoseError::parsing(format!("{} is not a valid configuration", path.display()))
            }
        })
    }

    /// Checks `config` against the containers of `model`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a `nodes` entry names no container, and
    /// a partial validation error if a container entry or the manager
    /// section is missing.
    pub fn validate(self, config: &ToskoseConfig, model: &TopologyModel) -> Result<()> {
        for name in config.nodes.keys() {
            if model.container(name).is_none() {
                return Err(ToskoseError::validation(format!(
                    "node {name} is not a container of the topology"
                )));
            }
        }

        let missing: Vec<String> = self
            .toskosed_containers(model)
            .into_iter()
            .filter(|name| !config.nodes.contains_key(name))
            .collect();
        for name in &missing {
            tracing::warn!(node = %name, "missing node data in the configuration");
        }
        if config.manager.is_none() {
            tracing::warn!("missing manager data in the configuration");
        }
        if !missing.is_empty() || config.manager.is_none() {
            return Err(ToskoseError::PartialValidation {
                message: "missing data from the configuration file".into(),
            });
        }
        Ok(())
    }

    /// Fills every missing field of `config`.
    ///
    /// Supervisor ports come from `ports`; ports already declared in
    /// `config` are reserved first so they are never generated twice.
    #[must_use]
    pub fn complete(
        self,
        mut config: ToskoseConfig,
        model: &TopologyModel,
        ports: &mut PortSequence,
    ) -> ToskoseConfig {
        for port in config
            .nodes
            .values()
            .flatten()
            .filter_map(|node| node.http_port)
        {
            ports.reserve(port);
        }

        for name in self.toskosed_containers(model) {
            let entry = config.nodes.entry(name.clone()).or_default();
            let node = entry.get_or_insert_with(|| {
                tracing::info!(node = %name, "missing node (auto-generated)");
                NodeConfig::default()
            });
            complete_node(&model.name, &name, node, ports);
        }

        let manager = config.manager.get_or_insert_with(|| {
            tracing::info!("missing manager (auto-generated)");
            ManagerConfig::default()
        });
        complete_manager(&model.name, manager);
        config
    }

    /// Converts a completed configuration into its resolved form.
    ///
    /// Only the containers scheduled for toskosing are settled; entries for
    /// pass-through containers are ignored.
    ///
    /// # Errors
    ///
    /// Returns a partial validation error if a required field is missing, and
    /// a validation error if two containers share a built image reference.
    pub fn settle(
        self,
        config: &ToskoseConfig,
        model: &TopologyModel,
        path: PathBuf,
    ) -> Result<ResolvedConfig> {
        let scheduled = self.toskosed_containers(model);
        for name in config.nodes.keys().filter(|name| !scheduled.contains(name)) {
            tracing::debug!(node = %name, "pass-through container, settings ignored");
        }

        let mut nodes = BTreeMap::new();
        for name in scheduled {
            let node = config
                .nodes
                .get(&name)
                .and_then(Option::as_ref)
                .ok_or_else(|| ToskoseError::PartialValidation {
                    message: format!("{name} field is missing in nodes"),
                })?;
            let settings = NodeSettings {
                alias: required(node.alias.clone(), &name, "alias")?,
                http_port: required(node.http_port, &name, "http_port")?,
                http_user: required(node.http_user.clone(), &name, "http_user")?,
                http_password: required(node.http_password.clone(), &name, "http_password")?,
                log_level: required(node.log_level.clone(), &name, "log_level")?,
                docker: docker_settings(node.docker.as_ref(), &name)?,
            };
            let _ = nodes.insert(name, settings);
        }

        let manager_name = constants::DEFAULT_MANAGER_NAME;
        let manager = config
            .manager
            .as_ref()
            .ok_or_else(|| ToskoseError::PartialValidation {
                message: "manager field is missing".into(),
            })?;
        let manager = ManagerSettings {
            alias: required(manager.alias.clone(), manager_name, "alias")?,
            http_port: required(manager.http_port, manager_name, "http_port")?,
            http_user: required(manager.http_user.clone(), manager_name, "http_user")?,
            http_password: required(manager.http_password.clone(), manager_name, "http_password")?,
            mode: required(manager.mode.clone(), manager_name, "mode")?,
            secret_key: required(manager.secret_key.clone(), manager_name, "secret_key")?,
            docker: docker_settings(manager.docker.as_ref(), manager_name)?,
        };

        ensure_unique_images(
            nodes
                .iter()
                .map(|(name, settings)| (name.as_str(), &settings.docker))
                .chain(std::iter::once((manager_name, &manager.docker))),
        )?;

        Ok(ResolvedConfig {
            path,
            nodes,
            manager,
        })
    }

    /// Writes `config` as YAML to `path`.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the document cannot be serialized or written.
    pub fn write(config: &ToskoseConfig, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(config).map_err(|e| {
            tracing::error!(error = %e, "failed to serialize the configuration");
            ToskoseError::fatal("failed to serialize the configuration")
        })?;
        std::fs::write(path, content).map_err(|e| ToskoseError::fatal_io(path, &e))
    }

    /// Runs the whole resolution for `model`.
    ///
    /// A user configuration at `config_path` is validated before completion;
    /// without one, every value is generated. The completed document is
    /// written as `toskose.yml` beside the manifest.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Self::load`], [`Self::validate`],
    /// [`Self::settle`], and [`Self::write`].
    pub fn resolve(
        self,
        config_path: Option<&Path>,
        model: &TopologyModel,
    ) -> Result<ResolvedConfig> {
        let config = match config_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "configuration detected");
                let config = Self::load(path)?;
                self.validate(&config, model)?;
                config
            }
            None => {
                tracing::info!("no configuration detected, default data will be generated");
                ToskoseConfig::default()
            }
        };

        let mut ports = PortSequence::new(constants::DEFAULT_SUPERVISORD_INIT_HTTP_PORT);
        let completed = self.complete(config, model, &mut ports);
        let path = model
            .manifest_path
            .parent()
            .unwrap_or(model.base_dir.as_path())
            .join(constants::DEFAULT_TOSKOSE_CONFIG_FILENAME);
        Self::write(&completed, &path)?;
        tracing::info!(path = %path.display(), "configuration stored");
        self.settle(&completed, model, path)
    }
}

fn complete_node(app: &str, name: &str, node: &mut NodeConfig, ports: &mut PortSequence) {
    fill(&mut node.alias, name, "alias", || name.to_string());
    fill(&mut node.http_port, name, "http_port", || {
        ports
            .next()
            .unwrap_or(constants::DEFAULT_SUPERVISORD_INIT_HTTP_PORT)
    });
    fill(&mut node.http_user, name, "http_user", || {
        constants::DEFAULT_SUPERVISORD_HTTP_USER.to_string()
    });
    fill(&mut node.http_password, name, "http_password", || {
        constants::DEFAULT_SUPERVISORD_HTTP_PASSWORD.to_string()
    });
    fill(&mut node.log_level, name, "log_level", || {
        constants::DEFAULT_SUPERVISORD_LOG_LEVEL.to_string()
    });
    complete_docker(app, name, node.docker.get_or_insert_with(DockerConfig::default));
}

fn complete_manager(app: &str, manager: &mut ManagerConfig) {
    let name = constants::DEFAULT_MANAGER_NAME;
    fill(&mut manager.alias, name, "alias", || name.to_string());
    fill(&mut manager.http_port, name, "http_port", || {
        constants::DEFAULT_MANAGER_HTTP_PORT
    });
    fill(&mut manager.http_user, name, "http_user", || {
        constants::DEFAULT_MANAGER_USER.to_string()
    });
    fill(&mut manager.http_password, name, "http_password", || {
        constants::DEFAULT_MANAGER_PASSWORD.to_string()
    });
    fill(&mut manager.mode, name, "mode", || {
        constants::DEFAULT_MANAGER_APP_MODE.to_string()
    });
    fill(&mut manager.secret_key, name, "secret_key", || {
        constants::DEFAULT_MANAGER_SECRET_KEY.to_string()
    });
    complete_docker(app, name, manager.docker.get_or_insert_with(DockerConfig::default));
}

fn complete_docker(app: &str, name: &str, docker: &mut DockerConfig) {
    fill(&mut docker.name, name, "docker.name", || {
        constants::default_image_name(app, name)
    });
    fill(&mut docker.tag, name, "docker.tag", || {
        constants::DEFAULT_IMAGE_TAG.to_string()
    });
}

fn fill<T>(slot: &mut Option<T>, node: &str, field: &str, default: impl FnOnce() -> T) {
    if slot.is_none() {
        tracing::info!(node = %node, field = %field, "missing field (auto-generated)");
        *slot = Some(default());
    }
}

fn required<T>(value: Option<T>, node: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| ToskoseError::PartialValidation {
        message: format!("{field} field is missing in {node}"),
    })
}

/// Every built image must be a distinct `name:tag` within one run.
fn ensure_unique_images<'a>(
    images: impl Iterator<Item = (&'a str, &'a DockerSettings)>,
) -> Result<()> {
    let mut seen: BTreeMap<(&str, &str), &str> = BTreeMap::new();
    for (node, docker) in images {
        if let Some(first) = seen.insert((docker.name.as_str(), docker.tag.as_str()), node) {
            tracing::error!(
                first,
                node,
                name = %docker.name,
                tag = %docker.tag,
                "duplicated image"
            );
            return Err(ToskoseError::validation(format!(
                "{first} and {node} are both built as {}:{}",
                docker.name, docker.tag
            )));
        }
    }
    Ok(())
}

fn docker_settings(docker: Option<&DockerConfig>, node: &str) -> Result<DockerSettings> {
    let docker = docker.ok_or_else(|| ToskoseError::PartialValidation {
        message: format!("docker field is missing in {node}"),
    })?;
    Ok(DockerSettings {
        name: required(docker.name.clone(), node, "docker.name")?,
        tag: required(docker.tag.clone(), node, "docker.tag")?,
        registry_password: docker.registry_password.clone(),
        base_name: docker.base_name.clone(),
        base_tag: docker.base_tag.clone(),
    })
}
