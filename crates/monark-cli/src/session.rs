//! Session files: the serialized input of one resolver run.
//!
//! A session carries the global configuration variables, the module set
//! with its peer edges, and the root modules to resolve. Modules refer
//! to each other by name; edges are materialized into a [`ModuleGraph`]
//! when the session is built.

use serde::{Deserialize, Serialize};

use monark_core::graph::ModuleGraph;
use monark_core::module::Module;
use monark_core::vars::Vars;
use monark_core::ModuleId;
use monark_util::errors::{MonarkError, MonarkResult};

/// One module entry in a session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionModule {
    #[serde(flatten)]
    pub module: Module,
    /// Peer module names, in declaration order.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Peers opted out of dependency management.
    #[serde(default)]
    pub ghost_peers: Vec<String>,
}

/// A complete resolver session.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub globals: Vars,
    pub modules: Vec<SessionModule>,
    /// Names of the modules to resolve.
    pub roots: Vec<String>,
}

impl Session {
    pub fn from_json(data: &str) -> MonarkResult<Self> {
        serde_json::from_str(data).map_err(|e| {
            MonarkError::Session {
                message: format!("failed to parse session: {e}"),
            }
            .into()
        })
    }

    pub fn load(path: &str) -> MonarkResult<Self> {
        let data = std::fs::read_to_string(path).map_err(MonarkError::Io)?;
        Self::from_json(&data)
    }

    /// Materialize the session into a module graph.
    ///
    /// Every peer and root reference must name a declared module.
    pub fn build(&self) -> MonarkResult<(ModuleGraph, Vars, Vec<ModuleId>)> {
        let mut graph = ModuleGraph::new();
        for entry in &self.modules {
            graph.add_module(entry.module.clone());
        }

        let resolve_name = |graph: &ModuleGraph, name: &str, owner: &str| -> MonarkResult<ModuleId> {
            graph.find(name).ok_or_else(|| {
                MonarkError::Session {
                    message: format!("module {owner} references unknown module {name}"),
                }
                .into()
            })
        };

        for entry in &self.modules {
            // Every entry was added above; duplicates collapse by name.
            let Some(from) = graph.find(&entry.module.name) else {
                continue;
            };
            for peer in &entry.peers {
                let to = resolve_name(&graph, peer, &entry.module.name)?;
                graph.add_peer(from, to);
            }
            for peer in &entry.ghost_peers {
                let to = resolve_name(&graph, peer, &entry.module.name)?;
                graph.add_ghost_peer(from, to);
            }
        }

        let mut roots = Vec::new();
        for name in &self.roots {
            let id = graph.find(name).ok_or_else(|| MonarkError::Session {
                message: format!("unknown root module {name}"),
            })?;
            roots.push(id);
        }
        Ok((graph, self.globals.clone(), roots))
    }

    /// Look up one module by name in a built graph.
    pub fn find_module(graph: &ModuleGraph, name: &str) -> MonarkResult<ModuleId> {
        graph.find(name).ok_or_else(|| {
            MonarkError::Session {
                message: format!("unknown module {name}"),
            }
            .into()
        })
    }
}
