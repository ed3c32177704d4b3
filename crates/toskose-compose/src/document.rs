//! Serializable docker-compose document.
//!
//! Every collection is owned and keyed by a `BTreeMap`, so the rendered
//! document is deterministic and never shares nodes (no anchors or aliases).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A docker-compose file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeDocument {
    /// Compose file format version.
    pub version: String,
    /// Services keyed by container name.
    pub services: BTreeMap<String, Service>,
    /// Networks keyed by name.
    pub networks: BTreeMap<String, Network>,
    /// Named volumes; `None` renders as an empty entry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Option<Volume>>,
}

/// One service of the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Image reference (`name:tag`).
    pub image: String,
    /// Hostname of a pass-through container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Runs an init process as PID 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    /// Network memberships; `None` keeps the default attachment.
    pub networks: BTreeMap<String, Option<NetworkAttachment>>,
    /// `KEY=value` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    /// `container:host/tcp` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// `volume:path` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Services that must start first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Swarm deployment policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<Deploy>,
}

/// Explicit attachment of a service to a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Names the service answers to on the network.
    pub aliases: Vec<String>,
}

/// Deployment policy of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    /// Restart behaviour.
    pub restart_policy: RestartPolicy,
}

/// Restart behaviour of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Restart condition (`on-failure`).
    pub condition: String,
}

/// A network definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network driver.
    pub driver: String,
    /// Lets standalone containers join the network.
    pub attachable: bool,
}

/// A named volume definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Driver options.
    pub driver_opts: BTreeMap<String, String>,
}
