//! # toskose-tosca
//!
//! Turns a TOSCA application package into a linked topology model.
//!
//! Handles:
//! - **Archive**: CSAR validation and unpacking.
//! - **Manifest**: raw decoding of the manifest and of its imported type files.
//! - **Value**: the `{Map, Sequence, Scalar, Function, File}` tree holding free-form data.
//! - **Functions**: resolution of `get_input`, `get_property`, and `get_artifact`.
//! - **Decode**: per-node decoding into container, software, and volume variants.
//! - **Link**: relationship linking, back-links, and the hosting extension pass.
//! - **Graph**: hosting graph analysis with `petgraph`.
//! - **Builder**: the [`TopologyModelBuilder`](builder::TopologyModelBuilder) entry point.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod archive;
pub mod builder;
pub mod decode;
pub mod functions;
pub mod graph;
pub mod link;
pub mod manifest;
pub mod model;
pub mod value;
