//! Deployment configuration models and pipeline settings.
//!
//! [`ToskoseConfig`] mirrors the `toskose.yml` document a user may provide:
//! every field is optional so a partial file can be completed later.
//! [`NodeSettings`] and [`ManagerSettings`] are the completed, fully
//! resolved forms consumed by the pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root of a (possibly partial) deployment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToskoseConfig {
    /// Optional title of the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Per-container settings, keyed by container node name.
    #[serde(default)]
    pub nodes: BTreeMap<String, Option<NodeConfig>>,
    /// Settings of the manager container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<ManagerConfig>,
}

/// Partial settings of one toskosed container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Network alias of the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Supervisor HTTP port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    /// Supervisor HTTP user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_user: Option<String>,
    /// Supervisor HTTP password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_password: Option<String>,
    /// Supervisor log level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Image naming of the built container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerConfig>,
}

/// Partial settings of the manager container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// Network alias of the manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Manager HTTP port (published as `port:port`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    /// Manager HTTP user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_user: Option<String>,
    /// Manager HTTP password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_password: Option<String>,
    /// Application mode of the manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Secret key of the manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Image naming of the built manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerConfig>,
}

/// Partial image naming of a built container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerConfig {
    /// Destination image name (`[registry/]user/name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Destination image tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Registry password used for pushing, if known up-front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_password: Option<String>,
    /// Override of the toskose base image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    /// Override of the toskose base image tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_tag: Option<String>,
}

/// Fully resolved image naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    /// Destination image name.
    pub name: String,
    /// Destination image tag.
    pub tag: String,
    /// Registry password used for pushing.
    pub registry_password: Option<String>,
    /// Override of the toskose base image.
    pub base_name: Option<String>,
    /// Override of the toskose base image tag.
    pub base_tag: Option<String>,
}

/// Fully resolved settings of one toskosed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    /// Network alias.
    pub alias: String,
    /// Supervisor HTTP port.
    pub http_port: u16,
    /// Supervisor HTTP user.
    pub http_user: String,
    /// Supervisor HTTP password.
    pub http_password: String,
    /// Supervisor log level.
    pub log_level: String,
    /// Image naming.
    pub docker: DockerSettings,
}

impl NodeSettings {
    /// Environment consumed by the supervisor inside the built image.
    #[must_use]
    pub fn supervisor_env(&self) -> Vec<(String, String)> {
        vec![
            ("SUPERVISORD_ALIAS".into(), self.alias.clone()),
            ("SUPERVISORD_HTTP_PORT".into(), self.http_port.to_string()),
            ("SUPERVISORD_HTTP_USER".into(), self.http_user.clone()),
            ("SUPERVISORD_HTTP_PASSWORD".into(), self.http_password.clone()),
            ("SUPERVISORD_LOG_LEVEL".into(), self.log_level.clone()),
        ]
    }
}

/// Fully resolved settings of the manager container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Network alias.
    pub alias: String,
    /// HTTP port, published on the same host port.
    pub http_port: u16,
    /// HTTP user.
    pub http_user: String,
    /// HTTP password.
    pub http_password: String,
    /// Application mode.
    pub mode: String,
    /// Secret key.
    pub secret_key: String,
    /// Image naming.
    pub docker: DockerSettings,
}

impl ManagerSettings {
    /// Environment consumed by the manager inside its image.
    #[must_use]
    pub fn manager_env(&self) -> Vec<(String, String)> {
        vec![
            ("TOSKOSE_MANAGER_PORT".into(), self.http_port.to_string()),
            ("TOSKOSE_APP_MODE".into(), self.mode.clone()),
            ("SECRET_KEY".into(), self.secret_key.clone()),
            (
                "TOSKOSE_LOGS_PATH".into(),
                constants::DEFAULT_MANAGER_LOGS_PATH.into(),
            ),
        ]
    }
}

/// The completed deployment configuration handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Where the completed configuration was written.
    pub path: PathBuf,
    /// Settings of every hosting container.
    pub nodes: BTreeMap<String, NodeSettings>,
    /// Settings of the manager.
    pub manager: ManagerSettings,
}

/// Settings of one toskosing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToskoseSettings {
    /// Container engine URL (`None` uses the local defaults).
    pub docker_url: Option<String>,
    /// Push every built image to its registry.
    pub enable_push: bool,
    /// Also toskose containers that host no software component.
    pub toskose_standalone: bool,
    /// Number of credential prompts after an image-not-found pull.
    pub auth_attempts: u32,
    /// Number of push attempts for one image.
    pub push_attempts: u32,
    /// Descriptor version to emit.
    pub compose_version: String,
    /// Descriptor file name.
    pub compose_file_name: String,
}

impl Default for ToskoseSettings {
    fn default() -> Self {
        Self {
            docker_url: None,
            enable_push: false,
            toskose_standalone: false,
            auth_attempts: constants::DEFAULT_AUTH_ATTEMPTS,
            push_attempts: constants::DEFAULT_PUSH_ATTEMPTS,
            compose_version: constants::DEFAULT_DOCKER_COMPOSE_VERSION.into(),
            compose_file_name: constants::DEFAULT_DOCKER_COMPOSE_FILENAME.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_deserializes() {
        let yaml = "nodes:\n  maven:\n    http_port: 9001\n    docker:\n      name: test/maven\n  node:\nmanager:\n  http_port: 10001\n";
        let config: ToskoseConfig = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(config.nodes.len(), 2);
        let maven = config.nodes["maven"].as_ref().expect("maven");
        assert_eq!(maven.http_port, Some(9001));
        assert_eq!(
            maven.docker.as_ref().and_then(|d| d.name.as_deref()),
            Some("test/maven")
        );
        assert!(config.nodes["node"].is_none());
        assert_eq!(config.manager.and_then(|m| m.http_port), Some(10001));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = "nodes:\n  maven:\n    htp_port: 9001\n";
        let result: Result<ToskoseConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn manager_env_carries_fixed_logs_path() {
        let manager = ManagerSettings {
            alias: "toskose-manager".into(),
            http_port: 10000,
            http_user: "admin".into(),
            http_password: "admin".into(),
            mode: "production".into(),
            secret_key: "secret".into(),
            docker: DockerSettings {
                name: "thinking-manager".into(),
                tag: "latest".into(),
                registry_password: None,
                base_name: None,
                base_tag: None,
            },
        };
        let env = manager.manager_env();
        assert!(env.contains(&("TOSKOSE_LOGS_PATH".into(), "/toskose/logs".into())));
        assert!(env.contains(&("TOSKOSE_MANAGER_PORT".into(), "10000".into())));
    }

    #[test]
    fn default_settings_use_bounded_budgets() {
        let settings = ToskoseSettings::default();
        assert_eq!(settings.auth_attempts, 3);
        assert_eq!(settings.push_attempts, 3);
        assert_eq!(settings.compose_version, "3.3");
        assert!(!settings.enable_push);
    }
}
