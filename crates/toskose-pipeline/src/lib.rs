//! # toskose-pipeline
//!
//! End-to-end toskosing of a TOSCA application package.
//!
//! Handles:
//! - **Resolver**: loading, validation, and auto-completion of the deployment configuration.
//! - **Updater**: merging the resolved configuration into the topology model.
//! - **Toskoserizator**: the driver running every stage for one archive.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod resolver;
pub mod toskoserizator;
pub mod updater;

pub use toskoserizator::Toskoserizator;
