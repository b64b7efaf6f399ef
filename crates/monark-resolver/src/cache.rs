//! Persisted resolution results.
//!
//! One cache record per resolved module, keyed by the stable module name
//! rather than by graph index: node ids are not stable across runs, so
//! restoring remaps every stored name through the current graph and
//! silently drops records whose module no longer exists.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use monark_core::graph::ModuleGraph;
use monark_core::vars;
use monark_core::ModuleId;
use monark_util::errors::{MonarkError, MonarkResult};

use crate::resolver::ManagedPeers;

/// Output variables worth persisting between runs.
const CACHED_VARS: [&str; 4] = [
    vars::MANAGED_PEERS,
    vars::MANAGED_PEERS_CLOSURE,
    vars::MANAGED_PEERS_ARTIFACTS,
    vars::NON_MANAGEABLE_PEERS,
];

/// The persisted state of one resolved module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCacheRecord {
    pub module: String,
    /// Resolved direct peers, by module name.
    pub direct: Vec<String>,
    /// Flattened resolved closure, by module name.
    pub closure: Vec<String>,
    /// Published output variables.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub peers_complete: bool,
}

/// Peer lists restored from a cache, remapped to current graph ids.
#[derive(Debug, Default)]
pub struct RestoredPeers {
    pub direct: Vec<ModuleId>,
    pub closure: Vec<ModuleId>,
}

/// A loadable/storable set of per-module resolution results.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResolutionCache {
    pub records: Vec<ModuleCacheRecord>,
}

impl ResolutionCache {
    /// Capture the engine's per-module results, ordered by module name so
    /// serialized output is reproducible.
    pub fn snapshot(graph: &ModuleGraph, records: &HashMap<ModuleId, ManagedPeers>) -> Self {
        let mut out: Vec<ModuleCacheRecord> = records
            .iter()
            .map(|(&id, record)| {
                let module = graph.module(id);
                let mut cached_vars = BTreeMap::new();
                for key in CACHED_VARS {
                    let value = module.var(key);
                    if !value.is_empty() {
                        cached_vars.insert(key.to_string(), value.to_string());
                    }
                }
                ModuleCacheRecord {
                    module: module.name.clone(),
                    direct: record
                        .direct
                        .iter()
                        .map(|p| graph.module(p.id).name.clone())
                        .collect(),
                    closure: record
                        .resolved
                        .iter()
                        .map(|&p| graph.module(p).name.clone())
                        .collect(),
                    vars: cached_vars,
                    peers_complete: module.peers_complete,
                }
            })
            .collect();
        out.sort_by(|a, b| a.module.cmp(&b.module));
        Self { records: out }
    }

    /// Write records back onto the graph, remapping names to current ids.
    ///
    /// Records naming modules absent from the graph are skipped, as are
    /// peer names that no longer resolve.
    pub fn restore(&self, graph: &mut ModuleGraph) -> HashMap<ModuleId, RestoredPeers> {
        let mut restored = HashMap::new();
        for record in &self.records {
            let Some(id) = graph.find(&record.module) else {
                tracing::warn!(module = %record.module, "cached module no longer in graph, record dropped");
                continue;
            };
            let remap = |names: &[String], graph: &ModuleGraph| -> Vec<ModuleId> {
                names.iter().filter_map(|name| graph.find(name)).collect()
            };
            let peers = RestoredPeers {
                direct: remap(&record.direct, graph),
                closure: remap(&record.closure, graph),
            };
            let module = graph.module_mut(id);
            for (key, value) in &record.vars {
                module.set_var(key.clone(), value.clone());
            }
            module.peers_complete = record.peers_complete;
            restored.insert(id, peers);
        }
        restored
    }

    pub fn to_json(&self) -> MonarkResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            MonarkError::Session {
                message: format!("failed to serialize resolution cache: {e}"),
            }
            .into()
        })
    }

    pub fn from_json(data: &str) -> MonarkResult<Self> {
        serde_json::from_str(data).map_err(|e| {
            MonarkError::Session {
                message: format!("failed to parse resolution cache: {e}"),
            }
            .into()
        })
    }
}
