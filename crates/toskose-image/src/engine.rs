//! Container-engine abstraction.
//!
//! The builder only talks to a [`ContainerEngine`]. Engine failures are
//! reported as [`EngineError`]s and translated into domain errors by the
//! caller, so raw engine responses never leave this crate.

use std::path::Path;

use thiserror::Error;
use toskose_common::types::ImageReference;

/// Failure reported by a container engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The image does not exist, or exists behind authentication.
    #[error("image not found: {0}")]
    NotFound(String),
    /// The registry refused the credentials.
    #[error("access denied: {0}")]
    Denied(String),
    /// Any other engine failure.
    #[error("engine failure: {0}")]
    Other(String),
}

/// Result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Registry credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// Registry user.
    pub username: String,
    /// Registry password.
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Data read from an image inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDetails {
    /// Image id.
    pub id: String,
    /// References pointing to the image (`name:tag`).
    pub tags: Vec<String>,
    /// Configured `ENTRYPOINT`.
    pub entrypoint: Vec<String>,
    /// Configured `CMD`.
    pub cmd: Vec<String>,
}

/// One decoded entry of a streamed build or push response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressLine {
    /// A progress or status message.
    Info(String),
    /// An explicit error entry.
    Error(String),
}

impl ProgressLine {
    /// Returns the error message of an error entry.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            Self::Info(_) => None,
        }
    }
}

/// A multi-stage build request.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Build context directory.
    pub context: &'a Path,
    /// Dockerfile name, relative to the context.
    pub dockerfile: &'a str,
    /// Reference of the produced image.
    pub tag: &'a ImageReference,
    /// Named build arguments.
    pub build_args: Vec<(String, String)>,
}

/// Operations consumed from a container engine.
///
/// Every call blocks until the engine finished the operation.
pub trait ContainerEngine {
    /// Checks that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    fn ping(&self) -> EngineResult<()>;

    /// Pulls an image, optionally with registry credentials.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the image cannot be found.
    fn pull(
        &self,
        image: &ImageReference,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<()>;

    /// Inspects a local image.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the image is not present.
    fn inspect(&self, image: &ImageReference) -> EngineResult<ImageDetails>;

    /// Returns every local `name:tag` reference of a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list images.
    fn image_tags(&self, name: &str) -> EngineResult<Vec<String>>;

    /// Force-removes one image reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be removed.
    fn remove(&self, image: &ImageReference) -> EngineResult<()>;

    /// Runs a build and returns the decoded build log.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request.
    fn build(&self, request: &BuildRequest<'_>) -> EngineResult<Vec<ProgressLine>>;

    /// Pushes an image and returns the decoded push log.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the request.
    fn push(
        &self,
        image: &ImageReference,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<Vec<ProgressLine>>;

    /// Releases the engine connection.
    fn close(&self) {}
}
