//! The module dependency graph.
//!
//! A petgraph-backed arena of modules connected by peer edges. All engine
//! structures key modules by the lightweight copyable [`ModuleId`] index,
//! never by reference, so resolution state carries no lifetime coupling
//! to the graph itself.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::module::{Module, PeerEdge};

/// Index of a module within the graph arena.
pub type ModuleId = NodeIndex;

/// The module graph the resolution engine runs over.
///
/// The host guarantees the peer relation is acyclic; the engine treats a
/// cycle as a fatal structural error.
pub struct ModuleGraph {
    graph: DiGraph<Module, PeerEdge>,
    /// Lookup from module name to its index.
    by_name: HashMap<String, ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add a module. Names must be unique; a duplicate name returns the
    /// existing index unchanged.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.by_name.get(&module.name) {
            return id;
        }
        let name = module.name.clone();
        let id = self.graph.add_node(module);
        self.by_name.insert(name, id);
        id
    }

    /// Add a direct peer edge from `from` to `to`.
    pub fn add_peer(&mut self, from: ModuleId, to: ModuleId) {
        self.graph.add_edge(from, to, PeerEdge { ghost: false });
    }

    /// Add a ghost peer edge: the consumer wants the un-replaced target.
    pub fn add_ghost_peer(&mut self, from: ModuleId, to: ModuleId) {
        self.graph.add_edge(from, to, PeerEdge { ghost: true });
    }

    /// Look up a module by name.
    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.graph[id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.graph[id]
    }

    /// Direct peers of a module, in declaration order.
    ///
    /// petgraph yields outgoing edges most-recently-added first; peer
    /// order is semantically meaningful, so the list is reversed back to
    /// insertion order.
    pub fn direct_peers(&self, id: ModuleId) -> Vec<(ModuleId, PeerEdge)> {
        let mut out: Vec<(ModuleId, PeerEdge)> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        out.reverse();
        out
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All module ids, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> {
        self.graph.node_indices()
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}
