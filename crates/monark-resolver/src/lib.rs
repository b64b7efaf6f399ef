//! Dependency-management resolution engine for the Monark build tool.
//!
//! Given a module graph with peer edges and a set of version-management
//! rules, the engine computes, per module, a single deterministic set of
//! resolved transitive dependencies, even when the graph contains
//! multiple incompatible versions of the same library reachable through
//! different paths.
//!
//! The engine is single-threaded, performs no I/O, and always runs the
//! full traversal: configuration problems accumulate in a
//! [`diag::Diagnostics`] report instead of aborting, so one run surfaces
//! every problem.

pub mod cache;
pub mod closure;
pub mod conflict;
pub mod diag;
pub mod explain;
pub mod resolver;
pub mod rules;
pub mod version;
