//! State-machine tests for the image builder, driven by a scripted engine.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use toskose_common::error::{Result, ToskoseError};
use toskose_common::types::{ContainerRole, ImageReference};
use toskose_image::builder::{BuildPolicy, BuildState, ImageBuilder, ToskosingRequest};
use toskose_image::engine::{
    BuildRequest, ContainerEngine, EngineError, EngineResult, ImageDetails, ProgressLine,
    RegistryCredentials,
};
use toskose_image::prompt::{ConfirmationProvider, CredentialProvider};

#[derive(Default)]
struct ScriptedEngine {
    /// Pull outcomes for the source image, consumed in order; default is success.
    source_pulls: RefCell<VecDeque<EngineResult<()>>>,
    push_logs: RefCell<VecDeque<Vec<ProgressLine>>>,
    build_log: Vec<ProgressLine>,
    existing_tags: Vec<String>,
    pulls: RefCell<Vec<(String, bool)>>,
    removed: RefCell<Vec<String>>,
    builds: RefCell<Vec<(String, Vec<(String, String)>)>>,
    pushes: RefCell<Vec<Option<String>>>,
    details: ImageDetails,
}

impl ContainerEngine for ScriptedEngine {
    fn ping(&self) -> EngineResult<()> {
        Ok(())
    }

    fn pull(
        &self,
        image: &ImageReference,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<()> {
        self.pulls
            .borrow_mut()
            .push((image.to_string(), credentials.is_some()));
        if image.name.starts_with("diunipisocc/") {
            return Ok(());
        }
        self.source_pulls.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    fn inspect(&self, _image: &ImageReference) -> EngineResult<ImageDetails> {
        Ok(self.details.clone())
    }

    fn image_tags(&self, _name: &str) -> EngineResult<Vec<String>> {
        Ok(self.existing_tags.clone())
    }

    fn remove(&self, image: &ImageReference) -> EngineResult<()> {
        self.removed.borrow_mut().push(image.to_string());
        Ok(())
    }

    fn build(&self, request: &BuildRequest<'_>) -> EngineResult<Vec<ProgressLine>> {
        assert!(request.context.join(request.dockerfile).is_file());
        self.builds
            .borrow_mut()
            .push((request.dockerfile.to_string(), request.build_args.clone()));
        Ok(self.build_log.clone())
    }

    fn push(
        &self,
        _image: &ImageReference,
        credentials: Option<&RegistryCredentials>,
    ) -> EngineResult<Vec<ProgressLine>> {
        self.pushes
            .borrow_mut()
            .push(credentials.map(|c| c.password.clone()));
        Ok(self.push_logs.borrow_mut().pop_front().unwrap_or_default())
    }
}

struct ScriptedPrompt {
    answer: bool,
    confirmations: Cell<u32>,
    credential_requests: Cell<u32>,
}

impl ScriptedPrompt {
    fn answering(answer: bool) -> Self {
        Self {
            answer,
            confirmations: Cell::new(0),
            credential_requests: Cell::new(0),
        }
    }
}

impl CredentialProvider for ScriptedPrompt {
    fn credentials(&self, _image: &str) -> Result<RegistryCredentials> {
        self.credential_requests
            .set(self.credential_requests.get() + 1);
        Ok(RegistryCredentials {
            username: "user".into(),
            password: format!("attempt-{}", self.credential_requests.get()),
        })
    }
}

impl ConfirmationProvider for ScriptedPrompt {
    fn confirm(&self, _question: &str) -> Result<bool> {
        self.confirmations.set(self.confirmations.get() + 1);
        Ok(self.answer)
    }
}

fn policy(enable_push: bool) -> BuildPolicy {
    BuildPolicy {
        enable_push,
        auth_attempts: 3,
        push_attempts: 3,
    }
}

fn run(
    engine: &ScriptedEngine,
    prompt: &ScriptedPrompt,
    enable_push: bool,
) -> (Result<ImageReference>, Vec<BuildState>) {
    let context = tempfile::tempdir().expect("tempdir");
    let source = ImageReference::new("private/maven", "3");
    let destination = ImageReference::new("acme/thoughts-maven", "1.0");
    let mut builder = ImageBuilder::new(engine, prompt, prompt, policy(enable_push));
    let result = builder.toskose(&ToskosingRequest {
        app_name: "thoughts",
        role: ContainerRole::Regular,
        source: Some(&source),
        destination: &destination,
        base_name: None,
        base_tag: None,
        registry_password: Some("secret"),
        context: context.path(),
    });
    (result, builder.transitions().to_vec())
}

#[test]
fn regular_container_goes_through_every_state() {
    let engine = ScriptedEngine::default();
    let prompt = ScriptedPrompt::answering(true);

    let (result, transitions) = run(&engine, &prompt, true);

    assert_eq!(
        result.expect("toskosed"),
        ImageReference::new("acme/thoughts-maven", "1.0")
    );
    assert_eq!(
        transitions,
        vec![
            BuildState::Idle,
            BuildState::ResolvingBaseImage,
            BuildState::PullingSource,
            BuildState::RemovingStalePrevious,
            BuildState::Building,
            BuildState::Pushing,
            BuildState::Done,
        ]
    );
    let builds = engine.builds.borrow();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].0, "Dockerfile-unit");
    let args = &builds[0].1;
    assert!(args.contains(&("APP_NAME".into(), "thoughts".into())));
    assert!(args.contains(&("SRC_IMAGE".into(), "private/maven:3".into())));
    assert!(args.contains(&("TOSKOSE_BASE_IMG".into(), "diunipisocc/toskose-unit:latest".into())));
    assert_eq!(*engine.pushes.borrow(), vec![Some("secret".to_string())]);
    assert_eq!(prompt.confirmations.get(), 0);
}

#[test]
fn push_is_skipped_when_disabled() {
    let engine = ScriptedEngine::default();
    let prompt = ScriptedPrompt::answering(true);

    let (result, transitions) = run(&engine, &prompt, false);

    let _ = result.expect("toskosed");
    assert!(!transitions.contains(&BuildState::Pushing));
    assert!(engine.pushes.borrow().is_empty());
}

#[test]
fn authentication_budget_is_spent_exactly_once() {
    let engine = ScriptedEngine {
        source_pulls: RefCell::new(
            (0..4)
                .map(|_| Err(EngineError::NotFound("no such image".into())))
                .collect(),
        ),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, transitions) = run(&engine, &prompt, false);

    assert!(matches!(
        result,
        Err(ToskoseError::DockerAuthenticationFailed { .. })
    ));
    assert_eq!(prompt.confirmations.get(), 1);
    assert_eq!(prompt.credential_requests.get(), 3);
    assert_eq!(
        transitions
            .iter()
            .filter(|s| **s == BuildState::Authenticating)
            .count(),
        1
    );
    assert_eq!(transitions.last(), Some(&BuildState::Failed));
    assert!(engine.builds.borrow().is_empty());
}

#[test]
fn authentication_succeeds_on_a_later_attempt() {
    let engine = ScriptedEngine {
        source_pulls: RefCell::new(VecDeque::from(vec![
            Err(EngineError::NotFound("no such image".into())),
            Err(EngineError::Denied("unauthorized".into())),
            Ok(()),
        ])),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, _) = run(&engine, &prompt, false);

    let _ = result.expect("toskosed after authenticating");
    assert_eq!(prompt.credential_requests.get(), 2);
    let authenticated = engine
        .pulls
        .borrow()
        .iter()
        .filter(|(_, with_credentials)| *with_credentials)
        .count();
    assert_eq!(authenticated, 2);
}

#[test]
fn rejecting_the_image_reference_aborts() {
    let engine = ScriptedEngine {
        source_pulls: RefCell::new(VecDeque::from(vec![Err(EngineError::NotFound(
            "no such image".into(),
        ))])),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(false);

    let (result, _) = run(&engine, &prompt, false);

    let err = result.expect_err("aborted");
    assert!(err.is_user_abort());
    assert_eq!(prompt.credential_requests.get(), 0);
}

#[test]
fn unexpected_pull_failure_is_an_operation_error() {
    let engine = ScriptedEngine {
        source_pulls: RefCell::new(VecDeque::from(vec![Err(EngineError::Other(
            "connection reset".into(),
        ))])),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, _) = run(&engine, &prompt, false);

    assert!(matches!(result, Err(ToskoseError::DockerOperation { .. })));
    assert_eq!(prompt.confirmations.get(), 0);
}

#[test]
fn previous_build_with_the_same_tag_is_removed() {
    let engine = ScriptedEngine {
        existing_tags: vec![
            "acme/thoughts-maven:0.9".into(),
            "acme/thoughts-maven:1.0".into(),
        ],
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, _) = run(&engine, &prompt, false);

    let _ = result.expect("toskosed");
    assert_eq!(*engine.removed.borrow(), vec!["acme/thoughts-maven:1.0".to_string()]);
}

#[test]
fn build_error_line_fails_the_run() {
    let engine = ScriptedEngine {
        build_log: vec![
            ProgressLine::Info("Step 1/6".into()),
            ProgressLine::Error("COPY failed".into()),
        ],
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, transitions) = run(&engine, &prompt, true);

    assert!(matches!(result, Err(ToskoseError::DockerOperation { .. })));
    assert!(!transitions.contains(&BuildState::Pushing));
}

#[test]
fn denied_push_asks_for_fresh_credentials() {
    let denied = vec![ProgressLine::Error(
        "denied: requested access to the resource is denied".into(),
    )];
    let engine = ScriptedEngine {
        push_logs: RefCell::new(VecDeque::from(vec![denied, Vec::new()])),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, _) = run(&engine, &prompt, true);

    let _ = result.expect("pushed on retry");
    assert_eq!(
        *engine.pushes.borrow(),
        vec![Some("secret".to_string()), Some("attempt-1".to_string())]
    );
}

#[test]
fn image_without_namespace_pushes_without_preset_credentials() {
    let denied = vec![ProgressLine::Error(
        "denied: requested access to the resource is denied".into(),
    )];
    let engine = ScriptedEngine {
        push_logs: RefCell::new(VecDeque::from(vec![denied, Vec::new()])),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);
    let context = tempfile::tempdir().expect("tempdir");
    let destination = ImageReference::new("thoughts-maven-toskosed", "latest");
    let mut builder = ImageBuilder::new(&engine, &prompt, &prompt, policy(true));

    let _ = builder
        .toskose(&ToskosingRequest {
            app_name: "thoughts",
            role: ContainerRole::Regular,
            source: None,
            destination: &destination,
            base_name: None,
            base_tag: None,
            registry_password: Some("secret"),
            context: context.path(),
        })
        .expect("pushed on retry");

    assert_eq!(*engine.pushes.borrow(), vec![None, Some("attempt-1".to_string())]);
    assert_eq!(prompt.credential_requests.get(), 1);
}

#[test]
fn push_budget_exhaustion_is_fatal() {
    let denied = vec![ProgressLine::Error("unauthorized: authentication required".into())];
    let engine = ScriptedEngine {
        push_logs: RefCell::new(VecDeque::from(vec![denied.clone(), denied.clone(), denied])),
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);

    let (result, _) = run(&engine, &prompt, true);

    let err = result.expect_err("push budget exhausted");
    assert!(matches!(err, ToskoseError::Fatal { .. }));
    assert!(err.to_string().contains("reached max attempts"));
    assert_eq!(engine.pushes.borrow().len(), 3);
}

#[test]
fn manager_is_built_from_its_base_image() {
    let engine = ScriptedEngine::default();
    let prompt = ScriptedPrompt::answering(true);
    let context = tempfile::tempdir().expect("tempdir");
    let destination = ImageReference::new("acme/toskose-manager", "latest");
    let mut builder = ImageBuilder::new(&engine, &prompt, &prompt, policy(false));

    let _ = builder
        .toskose(&ToskosingRequest {
            app_name: "thoughts",
            role: ContainerRole::Manager,
            source: None,
            destination: &destination,
            base_name: None,
            base_tag: Some("1.2"),
            registry_password: None,
            context: context.path(),
        })
        .expect("manager toskosed");

    assert_eq!(builder.state(), BuildState::Done);
    assert_eq!(
        *engine.pulls.borrow(),
        vec![("diunipisocc/toskose-manager:1.2".to_string(), false)]
    );
    assert!(builder.transitions().contains(&BuildState::PullingSource));
    let builds = engine.builds.borrow();
    assert_eq!(builds[0].0, "Dockerfile-manager");
    assert!(builds[0]
        .1
        .contains(&("SRC_IMAGE".into(), "diunipisocc/toskose-manager:1.2".into())));
}

#[test]
fn launch_command_comes_from_image_metadata() {
    let engine = ScriptedEngine {
        details: ImageDetails {
            id: "sha256:abc".into(),
            tags: vec!["mongo:4".into()],
            entrypoint: vec!["docker-entrypoint.sh".into()],
            cmd: vec!["mongod".into()],
        },
        ..ScriptedEngine::default()
    };
    let prompt = ScriptedPrompt::answering(true);
    let mut builder = ImageBuilder::new(&engine, &prompt, &prompt, policy(false));

    let command = builder
        .launch_command(&ImageReference::new("mongo", "4"))
        .expect("command");

    assert_eq!(command, "/bin/sh -c 'docker-entrypoint.sh mongod'");
}
