//! # toskose-image
//!
//! Rebuilds container images so they run their hosted components under
//! supervisord.
//!
//! Handles:
//! - **Engine**: the [`ContainerEngine`](engine::ContainerEngine) seam and its value types.
//! - **Docker**: the `bollard` adapter driving a local or remote Docker engine.
//! - **Prompt**: credential and confirmation providers, with a console implementation.
//! - **Command**: launch-command discovery for standalone containers.
//! - **Builder**: the per-container pull, authenticate, build, and push state machine.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod command;
pub mod docker;
pub mod engine;
pub mod prompt;
