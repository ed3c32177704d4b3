//! Translation of a linked topology into a docker-compose descriptor.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use toskose_common::constants;
use toskose_common::error::{Result, ToskoseError};
use toskose_tosca::model::{ContainerRef, NodeKind, RelationshipKind, TopologyModel};

use crate::document::{
    ComposeDocument, Deploy, Network, NetworkAttachment, RestartPolicy, Service, Volume,
};

const START_OF_DOCUMENT: &str = "---\n";
const NETWORK_DRIVER: &str = "overlay";
const RESTART_CONDITION: &str = "on-failure";

/// A port declared by more than one mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCollision {
    /// Two containers publish the same host port.
    Host {
        /// Host port.
        port: u16,
        /// Container declaring the port a second time.
        container: String,
    },
    /// One container maps two host ports onto the same container port.
    Container {
        /// Container port.
        port: u16,
        /// Container declaring the port.
        container: String,
    },
}

impl fmt::Display for PortCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { port, container } => {
                write!(f, "host port {port} of {container} is already published")
            }
            Self::Container { port, container } => {
                write!(f, "container port {port} is mapped twice in {container}")
            }
        }
    }
}

/// A rendered-ready descriptor and the collisions found while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// The compose document.
    pub document: ComposeDocument,
    /// Port collisions, logged during generation.
    pub collisions: Vec<PortCollision>,
}

impl Descriptor {
    /// Renders the document with an explicit start-of-document marker.
    ///
    /// # Errors
    ///
    /// Returns [`ToskoseError::Translation`] if serialization fails.
    pub fn render(&self) -> Result<String> {
        let body = serde_yaml::to_string(&self.document).map_err(|e| {
            tracing::error!(error = %e, "failed to serialize the deployment descriptor");
            ToskoseError::Translation {
                message: "failed to render the deployment descriptor".into(),
            }
        })?;
        Ok(format!("{START_OF_DOCUMENT}{body}"))
    }

    /// Writes the rendered document as `dir/file_name`.
    ///
    /// # Errors
    ///
    /// Returns a translation error if rendering fails and a fatal error if
    /// the file cannot be written.
    pub fn write_to(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        std::fs::write(&path, self.render()?).map_err(|e| ToskoseError::fatal_io(&path, &e))?;
        tracing::info!(path = %path.display(), "deployment descriptor written");
        Ok(path)
    }
}

/// Builds docker-compose descriptors for one pinned format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorGenerator {
    version: String,
}

impl Default for DescriptorGenerator {
    fn default() -> Self {
        Self {
            version: constants::DEFAULT_DOCKER_COMPOSE_VERSION.to_string(),
        }
    }
}

impl DescriptorGenerator {
    /// Creates a generator for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`ToskoseError::Validation`] if the version is not supported.
    pub fn new(version: &str) -> Result<Self> {
        if !constants::DOCKER_COMPOSE_SUPPORTED_VERSIONS.contains(&version) {
            return Err(ToskoseError::validation(format!(
                "compose version {version} is not supported (supported: {})",
                constants::DOCKER_COMPOSE_SUPPORTED_VERSIONS.join(", ")
            )));
        }
        Ok(Self {
            version: version.to_string(),
        })
    }

    /// Returns the pinned format version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Translates `model` into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ToskoseError::Translation`] if a container has no image to
    /// reference.
    pub fn generate(&self, model: &TopologyModel) -> Result<Descriptor> {
        tracing::info!(
            app = %model.name,
            version = %self.version,
            "generating the deployment descriptor"
        );
        let mut collisions = Vec::new();
        let mut host_ports = BTreeSet::new();
        let mut services = BTreeMap::new();
        for container in model.containers() {
            let service = service(model, container, &mut host_ports, &mut collisions)?;
            let _ = services.insert(container.node.name.clone(), service);
        }

        let volumes = model
            .volumes()
            .map(|(node, volume)| {
                let definition = (!volume.driver_opts.is_empty()).then(|| Volume {
                    driver_opts: volume.driver_opts.iter().cloned().collect(),
                });
                (node.name.clone(), definition)
            })
            .collect();

        let networks = BTreeMap::from([(
            constants::TOSKOSE_NETWORK.to_string(),
            Network {
                driver: NETWORK_DRIVER.to_string(),
                attachable: true,
            },
        )]);

        Ok(Descriptor {
            document: ComposeDocument {
                version: self.version.clone(),
                services,
                networks,
                volumes,
            },
            collisions,
        })
    }
}

fn service(
    model: &TopologyModel,
    container: ContainerRef<'_>,
    host_ports: &mut BTreeSet<u16>,
    collisions: &mut Vec<PortCollision>,
) -> Result<Service> {
    let name = &container.node.name;
    tracing::debug!(container = %name, "translating container");
    let def = container.container;
    let image = def.final_image().ok_or_else(|| {
        tracing::error!(container = %name, "container has no image");
        ToskoseError::Translation {
            message: format!("container {name} has no image to deploy"),
        }
    })?;

    let mut container_ports = BTreeSet::new();
    let mut ports = Vec::with_capacity(def.ports.len());
    for mapping in &def.ports {
        if !host_ports.insert(mapping.host) {
            tracing::warn!(container = %name, port = mapping.host, "possible host port conflict");
            collisions.push(PortCollision::Host {
                port: mapping.host,
                container: name.clone(),
            });
        }
        if !container_ports.insert(mapping.container) {
            tracing::warn!(
                container = %name,
                port = mapping.container,
                "possible container port conflict"
            );
            collisions.push(PortCollision::Container {
                port: mapping.container,
                container: name.clone(),
            });
        }
        ports.push(format!("{}:{}/tcp", mapping.container, mapping.host));
    }

    let mut volumes: Vec<String> = container
        .node
        .relationships_of(RelationshipKind::AttachesTo)
        .filter_map(|rel| {
            let target = model.node(rel.target_id()?);
            let location = rel.location.as_deref()?;
            matches!(target.kind, NodeKind::Volume(_))
                .then(|| format!("{}:{location}", target.name))
        })
        .collect();
    volumes.extend(def.share_data.iter().cloned());

    let depends_on: BTreeSet<String> = container
        .node
        .relationships_of(RelationshipKind::DependsOn)
        .filter_map(|rel| {
            let id = rel.target_id()?;
            let target = model.node(id);
            match &target.kind {
                NodeKind::Container(_) => Some(target.name.clone()),
                NodeKind::Software(software) => software
                    .host_container
                    .map(|host| model.node(host).name.clone()),
                NodeKind::Volume(_) => None,
            }
        })
        .filter(|target| target != name)
        .collect();

    let network = if def.toskosed {
        let mut aliases: BTreeSet<String> = def.aliases.clone();
        let _ = aliases.insert(def.hostname.clone().unwrap_or_else(|| name.clone()));
        Some(NetworkAttachment {
            aliases: aliases.into_iter().collect(),
        })
    } else {
        None
    };

    Ok(Service {
        image: image.to_string(),
        hostname: if def.toskosed {
            None
        } else {
            def.hostname.clone()
        },
        init: def.toskosed.then_some(true),
        networks: BTreeMap::from([(constants::TOSKOSE_NETWORK.to_string(), network)]),
        environment: def.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
        ports,
        volumes,
        depends_on: depends_on.into_iter().collect(),
        deploy: def.toskosed.then(|| Deploy {
            restart_policy: RestartPolicy {
                condition: RESTART_CONDITION.to_string(),
            },
        }),
    })
}
