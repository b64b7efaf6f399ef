//! Shared utilities for the Monark build tool.
//!
//! This crate provides cross-cutting concerns used by all other Monark
//! crates: error types and repo-relative path helpers.

pub mod errors;
pub mod paths;
