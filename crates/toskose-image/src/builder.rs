//! The per-container toskosing state machine.
//!
//! ```text
//! Idle -> ResolvingBaseImage -> PullingSource -> [Authenticating]
//!      -> RemovingStalePrevious -> Building -> [Pushing] -> Done | Failed
//! ```
//!
//! Every engine failure is logged here and surfaced as a domain error.

use std::fmt;
use std::path::Path;

use toskose_common::constants;
use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::{ContainerRole, ImageReference};

use crate::command;
use crate::docker::is_denied;
use crate::engine::{BuildRequest, ContainerEngine, EngineError, RegistryCredentials};
use crate::prompt::{ConfirmationProvider, CredentialProvider};

const UNIT_DOCKERFILE: (&str, &str) = (
    "Dockerfile-unit",
    include_str!("../templates/Dockerfile-unit"),
);
const MANAGER_DOCKERFILE: (&str, &str) = (
    "Dockerfile-manager",
    include_str!("../templates/Dockerfile-manager"),
);

/// States of one toskosing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Nothing started yet.
    Idle,
    /// Checking the toskose base image.
    ResolvingBaseImage,
    /// Pulling the source image.
    PullingSource,
    /// Collecting registry credentials after a failed pull.
    Authenticating,
    /// Removing the previous build of the destination tag.
    RemovingStalePrevious,
    /// Running the multi-stage build.
    Building,
    /// Pushing the destination image.
    Pushing,
    /// The image is built (and pushed when enabled).
    Done,
    /// The run stopped on an error.
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Retry budgets and switches of the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicy {
    /// Push the built image.
    pub enable_push: bool,
    /// Credential prompts allowed after a failed pull.
    pub auth_attempts: u32,
    /// Total push attempts.
    pub push_attempts: u32,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self {
            enable_push: false,
            auth_attempts: constants::DEFAULT_AUTH_ATTEMPTS,
            push_attempts: constants::DEFAULT_PUSH_ATTEMPTS,
        }
    }
}

/// What to toskose.
#[derive(Debug, Clone, Copy)]
pub struct ToskosingRequest<'a> {
    /// Application name, passed as `APP_NAME`.
    pub app_name: &'a str,
    /// Role of the container, selecting base image and template.
    pub role: ContainerRole,
    /// Source image; the manager is built from its base image.
    pub source: Option<&'a ImageReference>,
    /// Image to produce.
    pub destination: &'a ImageReference,
    /// Base image name override.
    pub base_name: Option<&'a str>,
    /// Base image tag override.
    pub base_tag: Option<&'a str>,
    /// Password used for the first push attempt.
    pub registry_password: Option<&'a str>,
    /// Populated build context.
    pub context: &'a Path,
}

/// Drives a [`ContainerEngine`] through the toskosing of one image at a time.
pub struct ImageBuilder<'a> {
    engine: &'a dyn ContainerEngine,
    credentials: &'a dyn CredentialProvider,
    confirmation: &'a dyn ConfirmationProvider,
    policy: BuildPolicy,
    transitions: Vec<BuildState>,
}

impl fmt::Debug for ImageBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuilder")
            .field("policy", &self.policy)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}

impl<'a> ImageBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(
        engine: &'a dyn ContainerEngine,
        credentials: &'a dyn CredentialProvider,
        confirmation: &'a dyn ConfirmationProvider,
        policy: BuildPolicy,
    ) -> Self {
        Self {
            engine,
            credentials,
            confirmation,
            policy,
            transitions: vec![BuildState::Idle],
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BuildState {
        self.transitions.last().copied().unwrap_or(BuildState::Idle)
    }

    /// Returns every state entered by the last run, in order.
    #[must_use]
    pub fn transitions(&self) -> &[BuildState] {
        &self.transitions
    }

    fn enter(&mut self, state: BuildState) {
        tracing::trace!(state = %state, "image builder transition");
        self.transitions.push(state);
    }

    /// Toskoses one image and returns the produced reference.
    ///
    /// # Errors
    ///
    /// Returns a Docker operation error for engine failures,
    /// [`ToskoseError::OperationAbortedByUser`] if the user rejects the
    /// source reference, [`ToskoseError::DockerAuthenticationFailed`] when
    /// the credential budget is exhausted, and a fatal error when the push
    /// budget is exhausted or the context cannot be written.
    pub fn toskose(&mut self, request: &ToskosingRequest<'_>) -> Result<ImageReference> {
        self.transitions = vec![BuildState::Idle];
        match self.run(request) {
            Ok(()) => {
                self.enter(BuildState::Done);
                tracing::info!(image = %request.destination, "image toskosed");
                Ok(request.destination.clone())
            }
            Err(e) => {
                self.enter(BuildState::Failed);
                Err(e)
            }
        }
    }

    fn run(&mut self, request: &ToskosingRequest<'_>) -> Result<()> {
        self.enter(BuildState::ResolvingBaseImage);
        let (default_name, default_tag, (dockerfile, template)) = match request.role {
            ContainerRole::Regular => (
                constants::DEFAULT_TOSKOSE_UNIT_BASE_IMAGE,
                constants::DEFAULT_TOSKOSE_UNIT_BASE_TAG,
                UNIT_DOCKERFILE,
            ),
            ContainerRole::Manager => (
                constants::DEFAULT_MANAGER_BASE_IMAGE,
                constants::DEFAULT_MANAGER_BASE_TAG,
                MANAGER_DOCKERFILE,
            ),
        };
        let base = ImageReference::new(
            request.base_name.unwrap_or(default_name),
            request.base_tag.unwrap_or(default_tag),
        );
        self.engine.pull(&base, None).map_err(|e| {
            tracing::error!(image = %base, error = %e, "toskose base image unavailable");
            ToskoseError::docker(format!("the toskose base image {base} is not available"))
        })?;

        let source = match (request.role, request.source) {
            (ContainerRole::Manager, _) | (ContainerRole::Regular, None) => base.clone(),
            (ContainerRole::Regular, Some(source)) => source.clone(),
        };
        if source == base {
            self.enter(BuildState::PullingSource);
            tracing::debug!(image = %source, "source is the base image, already pulled");
        } else {
            self.pull_with_auth(&source)?;
        }

        self.enter(BuildState::RemovingStalePrevious);
        self.remove_stale(request.destination)?;

        self.enter(BuildState::Building);
        let dockerfile_path = request.context.join(dockerfile);
        std::fs::write(&dockerfile_path, template)
            .map_err(|e| ToskoseError::fatal_io(&dockerfile_path, &e))?;
        let build = BuildRequest {
            context: request.context,
            dockerfile,
            tag: request.destination,
            build_args: vec![
                ("APP_NAME".to_string(), request.app_name.to_string()),
                ("SRC_IMAGE".to_string(), source.to_string()),
                ("TOSKOSE_BASE_IMG".to_string(), base.to_string()),
            ],
        };
        tracing::info!(source = %source, destination = %request.destination, "toskosing image");
        let log = self.engine.build(&build).map_err(|e| {
            tracing::error!(image = %request.destination, error = %e, "build rejected");
            ToskoseError::docker(format!("failed to build {}", request.destination))
        })?;
        if let Some(error) = log.iter().find_map(|l| l.error()) {
            tracing::error!(image = %request.destination, error = %error, "build failed");
            return Err(ToskoseError::docker(format!(
                "failed to build {}",
                request.destination
            )));
        }

        if self.policy.enable_push {
            self.enter(BuildState::Pushing);
            self.push(request)?;
        }
        Ok(())
    }

    /// Pulls an image, falling back to interactive authentication when the
    /// engine cannot find it.
    fn pull_with_auth(&mut self, image: &ImageReference) -> Result<()> {
        self.enter(BuildState::PullingSource);
        tracing::info!(image = %image, "pulling");
        match self.engine.pull(image, None) {
            Ok(()) => Ok(()),
            Err(EngineError::NotFound(_) | EngineError::Denied(_)) => self.authenticate(image),
            Err(EngineError::Other(e)) => {
                tracing::error!(image = %image, error = %e, "pull failed");
                Err(ToskoseError::docker(format!("failed to pull {image}")))
            }
        }
    }

    fn authenticate(&mut self, image: &ImageReference) -> Result<()> {
        self.enter(BuildState::Authenticating);
        tracing::warn!(image = %image, "image may not exist or authentication is required");
        if !self.confirmation.confirm(&format!("Is [{image}] correct?"))? {
            tracing::error!(image = %image, "image cannot be found, aborted by the user");
            return Err(ToskoseError::OperationAbortedByUser {
                message: format!("pull of {image} aborted"),
            });
        }

        for attempt in 1..=self.policy.auth_attempts {
            let credentials = self.credentials.credentials(&image.to_string())?;
            match self.engine.pull(image, Some(&credentials)) {
                Ok(()) => return Ok(()),
                Err(EngineError::NotFound(_) | EngineError::Denied(_)) => {
                    tracing::warn!(
                        image = %image,
                        remaining = self.policy.auth_attempts - attempt,
                        "authentication failed"
                    );
                }
                Err(EngineError::Other(e)) => {
                    tracing::error!(image = %image, error = %e, "authenticated pull failed");
                    return Err(ToskoseError::docker(format!("failed to pull {image}")));
                }
            }
        }
        tracing::error!(image = %image, "every authentication attempt was used");
        Err(ToskoseError::DockerAuthenticationFailed {
            message: format!("authentication for {image} failed"),
        })
    }

    fn remove_stale(&self, destination: &ImageReference) -> Result<()> {
        let tags = self.engine.image_tags(&destination.name).map_err(|e| {
            tracing::error!(image = %destination, error = %e, "cannot list previous images");
            ToskoseError::docker(format!("failed to look up {}", destination.name))
        })?;
        let reference = destination.to_string();
        if !tags.contains(&reference) {
            tracing::debug!(image = %destination, "no previous image found");
            return Ok(());
        }
        self.engine.remove(destination).map_err(|e| {
            tracing::error!(image = %destination, error = %e, "cannot remove previous image");
            ToskoseError::docker(format!("failed to remove {reference}"))
        })?;
        tracing::info!(image = %destination, "removed previous reference");
        Ok(())
    }

    fn push(&self, request: &ToskosingRequest<'_>) -> Result<()> {
        let image = request.destination;
        let username = image
            .namespace()
            .and_then(|ns| ns.rsplit('/').next())
            .filter(|user| !user.is_empty());
        let mut credentials = match (username, request.registry_password) {
            (Some(username), Some(password)) => Some(RegistryCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            (None, Some(_)) => {
                tracing::warn!(
                    image = %image,
                    "no registry user in the image name, password ignored"
                );
                None
            }
            (_, None) => None,
        };

        for attempt in 1..=self.policy.push_attempts {
            tracing::info!(image = %image, attempt, "pushing");
            let denied = match self.engine.push(image, credentials.as_ref()) {
                Ok(log) => match log.iter().find_map(|l| l.error()) {
                    None => {
                        tracing::info!(image = %image, "image pushed");
                        return Ok(());
                    }
                    Some(error) if is_denied(error) => true,
                    Some(error) => {
                        tracing::error!(image = %image, error = %error, "push failed");
                        return Err(ToskoseError::docker(format!("failed to push {image}")));
                    }
                },
                Err(EngineError::Denied(_)) => true,
                Err(e) => {
                    tracing::error!(image = %image, error = %e, "push rejected");
                    return Err(ToskoseError::docker(format!("failed to push {image}")));
                }
            };
            if denied && attempt < self.policy.push_attempts {
                tracing::warn!(image = %image, "access to the repository denied");
                credentials = Some(self.credentials.credentials(&image.to_string())?);
            }
        }
        tracing::error!(image = %image, "reached max attempts for pushing");
        Err(ToskoseError::fatal(format!(
            "reached max attempts for pushing {image}"
        )))
    }

    /// Discovers the launch command of a standalone container's image.
    ///
    /// # Errors
    ///
    /// Returns the pull errors of [`ImageBuilder::toskose`] and a Docker
    /// operation error if the image cannot be inspected.
    pub fn launch_command(&mut self, image: &ImageReference) -> Result<String> {
        self.transitions = vec![BuildState::Idle];
        self.pull_with_auth(image)?;
        let details = self.engine.inspect(image).map_err(|e| {
            tracing::error!(image = %image, error = %e, "inspect failed");
            ToskoseError::docker(format!("failed to inspect {image}"))
        })?;
        let command = command::launch_command(&details.entrypoint, &details.cmd);
        tracing::debug!(image = %image, command = %command, "launch command discovered");
        Ok(command)
    }
}
