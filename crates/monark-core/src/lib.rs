//! Core data types for the Monark build tool.
//!
//! This crate defines the module dependency graph the resolution engine
//! operates on: build targets ("modules"), directed peer edges between
//! them, and the string-encoded declaration variables the host build
//! system attaches to each module and to the global scope.
//!
//! This crate is intentionally free of async code and I/O.

pub mod graph;
pub mod module;
pub mod vars;

pub use graph::{ModuleGraph, ModuleId};
pub use module::{Module, PeerEdge};
