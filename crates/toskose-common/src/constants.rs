//! System-wide constants, default values, and the in-container path contract.

/// Root of every toskosed application inside a built image.
pub const APPS_ROOT: &str = "/toskose/apps";

/// Shell invocation wrapping every supervised lifecycle script.
pub const SUPERVISED_SHELL: &str = "/bin/sh -c";

/// Name of the generated supervisor configuration file.
pub const SUPERVISORD_CONFIG_NAME: &str = "supervisord.conf";

/// Default name of the generated deployment configuration.
pub const DEFAULT_TOSKOSE_CONFIG_FILENAME: &str = "toskose.yml";

/// Default output directory created under the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "toskose_out";

/// Default deployment descriptor file name.
pub const DEFAULT_DOCKER_COMPOSE_FILENAME: &str = "docker-compose.yml";

/// Default deployment descriptor version.
pub const DEFAULT_DOCKER_COMPOSE_VERSION: &str = "3.3";

/// Deployment descriptor versions the generator can emit.
pub const DOCKER_COMPOSE_SUPPORTED_VERSIONS: &[&str] = &["3.3"];

/// Overlay network shared by every service of the descriptor.
pub const TOSKOSE_NETWORK: &str = "toskose-network";

/// Registry host that does not need to prefix image names.
pub const DOCKER_HUB_REGISTRY: &str = "registry.hub.docker.com";

/// Tag used whenever an image reference omits one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// First supervisor HTTP port; generated ports start right after it.
pub const DEFAULT_SUPERVISORD_INIT_HTTP_PORT: u16 = 9000;
/// Default supervisor HTTP user.
pub const DEFAULT_SUPERVISORD_HTTP_USER: &str = "admin";
/// Default supervisor HTTP password.
pub const DEFAULT_SUPERVISORD_HTTP_PASSWORD: &str = "admin";
/// Default supervisor log level.
pub const DEFAULT_SUPERVISORD_LOG_LEVEL: &str = "INFO";

/// Default base image used to toskose regular containers.
pub const DEFAULT_TOSKOSE_UNIT_BASE_IMAGE: &str = "diunipisocc/toskose-unit";
/// Default tag of the regular base image.
pub const DEFAULT_TOSKOSE_UNIT_BASE_TAG: &str = "latest";

/// Name of the manager container appended to every topology.
pub const DEFAULT_MANAGER_NAME: &str = "toskose-manager";
/// Default manager HTTP port.
pub const DEFAULT_MANAGER_HTTP_PORT: u16 = 10000;
/// Default manager user.
pub const DEFAULT_MANAGER_USER: &str = "admin";
/// Default manager password.
pub const DEFAULT_MANAGER_PASSWORD: &str = "admin";
/// Default manager application mode.
pub const DEFAULT_MANAGER_APP_MODE: &str = "production";
/// Default manager secret key.
pub const DEFAULT_MANAGER_SECRET_KEY: &str = "secret";
/// Log directory of the manager, fixed inside its image.
pub const DEFAULT_MANAGER_LOGS_PATH: &str = "/toskose/logs";

/// Default base image used to build the manager.
pub const DEFAULT_MANAGER_BASE_IMAGE: &str = "diunipisocc/toskose-manager";
/// Default tag of the manager base image.
pub const DEFAULT_MANAGER_BASE_TAG: &str = "latest";

/// Default number of registry credential prompts after a failed pull.
pub const DEFAULT_AUTH_ATTEMPTS: u32 = 3;
/// Default number of push attempts for one image.
pub const DEFAULT_PUSH_ATTEMPTS: u32 = 3;

/// Returns the default built-image name for a container of an application.
#[must_use]
pub fn default_image_name(app_name: &str, node_name: &str) -> String {
    format!("{app_name}-{node_name}-toskosed")
}

/// Returns the in-container directory of a hosted software component.
#[must_use]
pub fn software_root(software: &str) -> String {
    format!("{APPS_ROOT}/{software}")
}

/// Returns the in-container path of an artifact of a hosted software component.
#[must_use]
pub fn artifact_path(software: &str, basename: &str) -> String {
    format!("{APPS_ROOT}/{software}/artifacts/{basename}")
}

/// Returns the in-container path of a lifecycle script of a hosted software component.
#[must_use]
pub fn script_path(software: &str, basename: &str) -> String {
    format!("{APPS_ROOT}/{software}/scripts/{basename}")
}

/// Returns the in-container log file of one lifecycle operation.
#[must_use]
pub fn operation_log_path(software: &str, operation: &str) -> String {
    format!("{APPS_ROOT}/{software}/logs/{software}-{operation}.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_container_paths_follow_the_apps_layout() {
        assert_eq!(artifact_path("api", "api.jar"), "/toskose/apps/api/artifacts/api.jar");
        assert_eq!(script_path("api", "start.sh"), "/toskose/apps/api/scripts/start.sh");
        assert_eq!(
            operation_log_path("gui", "start"),
            "/toskose/apps/gui/logs/gui-start.log"
        );
        assert_eq!(software_root("db"), "/toskose/apps/db");
    }

    #[test]
    fn default_image_name_joins_app_and_node() {
        assert_eq!(default_image_name("thinking", "maven"), "thinking-maven-toskosed");
    }
}
