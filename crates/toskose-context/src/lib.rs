//! # toskose-context
//!
//! Materializes the filesystem tree merged into each rebuilt image.
//!
//! Handles:
//! - **Assembler**: per-container build contexts with one
//!   `artifacts/`, `scripts/`, `logs/` subtree per hosted component.
//! - **Supervisord**: generation of the `supervisord.conf` managing the
//!   lifecycle operations of the hosted components.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod assembler;
pub mod supervisord;
