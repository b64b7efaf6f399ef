//! Build targets and the edges between them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A build target owned by the module graph.
///
/// Modules are created once per build-graph traversal and are immutable
/// for the duration of a resolution run, except for the output variables
/// the engine writes back when a module is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Stable unique target name.
    pub name: String,
    /// Repo-relative module directory.
    pub dir: String,
    /// Path of the built artifact, for classpath-style consumers.
    #[serde(default)]
    pub artifact: String,
    /// Whether this module participates in dependency management.
    #[serde(default)]
    pub manages_deps: bool,
    /// Whether this module folds non-manageable peers into its own
    /// resolved closure instead of propagating them upward.
    #[serde(default)]
    pub consume_non_manageable: bool,
    /// Declared string variables (space-separated tokens, host-expanded).
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Set once the engine has published this module's resolved peers.
    #[serde(default)]
    pub peers_complete: bool,
}

impl Module {
    pub fn new(name: impl Into<String>, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        Self {
            name: name.into(),
            artifact: dir.clone(),
            dir,
            manages_deps: false,
            consume_non_manageable: false,
            vars: BTreeMap::new(),
            peers_complete: false,
        }
    }

    pub fn manages_deps(mut self, value: bool) -> Self {
        self.manages_deps = value;
        self
    }

    pub fn consume_non_manageable(mut self, value: bool) -> Self {
        self.consume_non_manageable = value;
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = artifact.into();
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// A declared variable's value, or `""` when absent.
    pub fn var(&self, key: &str) -> &str {
        self.vars.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

/// A directed dependency edge between two modules.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeerEdge {
    /// A ghost edge keeps the un-replaced target: the consuming module
    /// opted this single edge out of dependency management.
    #[serde(default)]
    pub ghost: bool,
}
