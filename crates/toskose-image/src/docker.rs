//! Docker engine adapter built on `bollard`.
//!
//! `bollard` is asynchronous; the adapter owns a current-thread `tokio`
//! runtime and blocks on every call, which keeps the pipeline sequential.

use std::collections::HashMap;
use std::path::Path;

use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::errors::Error as BollardError;
use bollard::image::{
    BuildImageOptions, CreateImageOptions, ListImagesOptions, PushImageOptions, RemoveImageOptions,
};
use futures_util::StreamExt;
use tokio::runtime::Runtime;
use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::ImageReference;

use crate::engine::{
    BuildRequest, ContainerEngine, EngineError, EngineResult, ImageDetails, ProgressLine,
    RegistryCredentials,
};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// A connection to a Docker engine.
#[derive(Debug)]
pub struct DockerEngine {
    client: Docker,
    runtime: Runtime,
}

impl DockerEngine {
    /// Connects to the engine at `url` (`unix://`, `tcp://`, `http://`),
    /// or to the local defaults, and pings it.
    ///
    /// # Errors
    ///
    /// Returns a Docker operation error if the connection or the ping fails.
    pub fn connect(url: Option<&str>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to start the engine runtime");
                ToskoseError::fatal("failed to start the engine runtime")
            })?;

        let client = match url {
            Some(u) if u.starts_with("unix://") => {
                Docker::connect_with_unix(u, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Some(u) if u.starts_with("tcp://") || u.starts_with("http://") => {
                Docker::connect_with_http(u, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Some(u) => {
                return Err(ToskoseError::validation(format!(
                    "unsupported Docker engine URL {u}"
                )));
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| {
            tracing::error!(error = %e, "failed to connect to the Docker engine");
            ToskoseError::docker("failed to connect to the Docker engine")
        })?;

        let engine = Self { client, runtime };
        engine.ping().map_err(|e| {
            tracing::error!(error = %e, "Docker engine ping failed");
            ToskoseError::docker("failed to connect to the Docker engine")
        })?;
        tracing::debug!(url = url.unwrap_or("local"), "connected to the Docker engine");
        Ok(engine)
    }
}

fn classify(error: BollardError) -> EngineError {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code: 401 | 403,
            message,
        } => EngineError::Denied(message),
        BollardError::DockerResponseServerError { message, .. } => classify_message(message),
        BollardError::DockerStreamError { error } => classify_message(error),
        other => EngineError::Other(other.to_string()),
    }
}

fn classify_message(message: String) -> EngineError {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("does not exist") {
        EngineError::NotFound(message)
    } else if is_denied(&lower) {
        EngineError::Denied(message)
    } else {
        EngineError::Other(message)
    }
}

/// Returns `true` if an engine message signals refused credentials.
#[must_use]
pub fn is_denied(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("denied") || lower.contains("unauthorized")
}

fn docker_credentials(
    image: &ImageReference,
    credentials: Option<&RegistryCredentials>,
) -> Option<DockerCredentials> {
    credentials.map(|c| DockerCredentials {
        username: Some(c.username.clone()),
        password: Some(c.password.clone()),
        serveraddress: registry_host(&image.name),
        ..Default::default()
    })
}

/// Returns the registry host of an image name, if it names one.
fn registry_host(name: &str) -> Option<String> {
    let (first, _) = name.split_once('/')?;
    (first.contains('.') || first.contains(':') || first == "localhost").then(|| first.to_string())
}

fn tar_context(context: &Path) -> EngineResult<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive
        .append_dir_all(".", context)
        .map_err(|e| EngineError::Other(format!("cannot archive {}: {e}", context.display())))?;
    archive
        .into_inner()
        .map_err(|e| EngineError::Other(format!("cannot archive {}: {e}", context.display())))
}

impl ContainerEngine for DockerEngine {
    fn ping(&self) -> EngineResult<()> {
        self.runtime
            .block_on(self.client.ping())
            .map(|_| ())
            .map_err(classify)
    }

    fn pull(
        &self,
        image: &ImageReference,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<()> {
        let options = CreateImageOptions {
            from_image: image.name.clone(),
            tag: image.tag.clone(),
            ..Default::default()
        };
        let auth = docker_credentials(image, credentials);
        self.runtime.block_on(async {
            let mut stream = std::pin::pin!(self.client.create_image(Some(options), None, auth));
            while let Some(item) = stream.next().await {
                let info = item.map_err(classify)?;
                if let Some(error) = info.error {
                    return Err(classify_message(error));
                }
                if let Some(status) = info.status {
                    tracing::trace!(image = %image, status = %status, "pull");
                }
            }
            Ok(())
        })
    }

    fn inspect(&self, image: &ImageReference) -> EngineResult<ImageDetails> {
        let inspect = self
            .runtime
            .block_on(self.client.inspect_image(&image.to_string()))
            .map_err(classify)?;
        let config = inspect.config.unwrap_or_default();
        Ok(ImageDetails {
            id: inspect.id.unwrap_or_default(),
            tags: inspect.repo_tags.unwrap_or_default(),
            entrypoint: config.entrypoint.unwrap_or_default(),
            cmd: config.cmd.unwrap_or_default(),
        })
    }

    fn image_tags(&self, name: &str) -> EngineResult<Vec<String>> {
        let options = ListImagesOptions::<String> {
            filters: HashMap::from([("reference".to_string(), vec![name.to_string()])]),
            ..Default::default()
        };
        let images = self
            .runtime
            .block_on(self.client.list_images(Some(options)))
            .map_err(classify)?;
        Ok(images.into_iter().flat_map(|i| i.repo_tags).collect())
    }

    fn remove(&self, image: &ImageReference) -> EngineResult<()> {
        let options = RemoveImageOptions {
            force: true,
            noprune: false,
        };
        let removed = self
            .runtime
            .block_on(self.client.remove_image(&image.to_string(), Some(options), None))
            .map_err(classify)?;
        tracing::debug!(image = %image, entries = removed.len(), "image reference removed");
        Ok(())
    }

    fn build(&self, request: &BuildRequest<'_>) -> EngineResult<Vec<ProgressLine>> {
        let archive = tar_context(request.context)?;
        let options = BuildImageOptions {
            dockerfile: request.dockerfile.to_string(),
            t: request.tag.to_string(),
            buildargs: request.build_args.iter().cloned().collect(),
            rm: true,
            ..Default::default()
        };
        self.runtime.block_on(async {
            let mut lines = Vec::new();
            let mut stream = std::pin::pin!(self.client.build_image(
                options,
                None,
                Some(bytes::Bytes::from(archive)),
            ));
            while let Some(item) = stream.next().await {
                match item {
                    Ok(info) => {
                        if let Some(error) = info.error {
                            lines.push(ProgressLine::Error(error));
                        } else if let Some(text) = info.stream.or(info.status) {
                            tracing::debug!(image = %request.tag, "{}", text.trim_end());
                            lines.push(ProgressLine::Info(text));
                        }
                    }
                    Err(BollardError::DockerStreamError { error }) => {
                        lines.push(ProgressLine::Error(error));
                    }
                    Err(other) => return Err(classify(other)),
                }
            }
            Ok(lines)
        })
    }

    fn push(
        &self,
        image: &ImageReference,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<Vec<ProgressLine>> {
        let options = PushImageOptions {
            tag: image.tag.clone(),
        };
        let auth = docker_credentials(image, credentials);
        self.runtime.block_on(async {
            let mut lines = Vec::new();
            let mut stream =
                std::pin::pin!(self.client.push_image(&image.name, Some(options), auth));
            while let Some(item) = stream.next().await {
                match item {
                    Ok(info) => match (info.error, info.status) {
                        (Some(error), _) => lines.push(ProgressLine::Error(error)),
                        (None, Some(status)) => lines.push(ProgressLine::Info(status)),
                        (None, None) => {}
                    },
                    Err(BollardError::DockerStreamError { error }) => {
                        lines.push(ProgressLine::Error(error));
                    }
                    Err(other) => return Err(classify(other)),
                }
            }
            Ok(lines)
        })
    }

    fn close(&self) {
        tracing::debug!("Docker engine connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_responses_are_classified() {
        let err = classify(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "pull access denied for nope, repository does not exist".into(),
        });
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn denied_stream_errors_are_classified() {
        let err = classify(BollardError::DockerStreamError {
            error: "unauthorized: authentication required".into(),
        });
        assert!(matches!(err, EngineError::Denied(_)));
    }

    #[test]
    fn registry_host_is_detected() {
        assert_eq!(
            registry_host("registry.example.org:5000/team/api"),
            Some("registry.example.org:5000".into())
        );
        assert_eq!(registry_host("localhost/api"), Some("localhost".into()));
        assert_eq!(registry_host("team/api"), None);
        assert_eq!(registry_host("api"), None);
    }

    #[test]
    fn context_is_archived() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("supervisord.conf"), "[supervisord]\n").expect("write");
        let bytes = tar_context(dir.path()).expect("archive");
        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .expect("entries")
            .map(|e| e.expect("entry").path().expect("path").display().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("supervisord.conf")));
    }
}
