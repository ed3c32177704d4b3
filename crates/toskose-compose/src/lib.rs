//! # toskose-compose
//!
//! Deployment descriptor generation for toskosed topologies.
//!
//! Handles:
//! - **Document**: the `serde` model of a docker-compose file.
//! - **Generator**: translation of a linked topology into networks, volumes, and services,
//!   with port-collision detection.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod document;
pub mod generator;
