//! The resolution orchestrator.
//!
//! A [`Resolver`] owns one engine run over a module graph: it walks the
//! peer relation bottom-up so every manageable peer is finalized before
//! its consumers, and per module compiles rules, builds the peer
//! closure, runs conflict resolution over it, and publishes the
//! flattened result back onto the module as output variables.
//!
//! All per-module results are memoized by module id for the lifetime of
//! the run; later modules only read earlier modules' published state.

use std::collections::{HashMap, HashSet, VecDeque};

use monark_core::graph::ModuleGraph;
use monark_core::vars::{self, Vars};
use monark_core::ModuleId;
use monark_util::errors::{MonarkError, MonarkResult};
use monark_util::paths;

use crate::closure::PeerClosure;
use crate::conflict::{ConflictResolver, ResolutionInfo, ResolveKind, ResolvedPeer};
use crate::diag::{DiagKind, Diagnostics};
use crate::rules::{DmConfig, DmRules, PendingConfErrors};

/// Everything the engine computed for one module.
#[derive(Debug, Default)]
pub struct ManagedPeers {
    /// Classified direct peers, in declaration order.
    pub direct: Vec<ResolvedPeer>,
    /// Merged transitive closure with path counts and exclusions.
    pub closure: PeerClosure,
    /// Final flattened dependency list, preorder, deduplicated.
    pub resolved: Vec<ModuleId>,
    /// Replacement map from the conflict resolution run, for explain
    /// output.
    pub resolution: HashMap<ModuleId, ResolutionInfo>,
    /// Direct peers that do not participate in dependency management.
    pub unmanageable: Vec<ModuleId>,
    /// Transitive non-manageable set, propagated upward unless consumed.
    pub unmanageable_closure: Vec<ModuleId>,
}

/// One traversal frame of the bottom-up walk.
struct Frame {
    id: ModuleId,
    /// Manageable peers to descend into, ghost edges included.
    peers: Vec<ModuleId>,
    next: usize,
    unmanageable: Vec<ModuleId>,
}

/// The engine run state: graph access, global configuration, and the
/// per-module memo table.
pub struct Resolver<'g> {
    graph: &'g mut ModuleGraph,
    config: DmConfig,
    managed: HashMap<ModuleId, ManagedPeers>,
    /// Proxy module -> its single versioned child.
    proxies: HashMap<ModuleId, ModuleId>,
    /// Versioned library dir -> module id, grown as modules finalize.
    lib_index: HashMap<String, ModuleId>,
    /// Forced-pin violations awaiting per-root reconciliation.
    pending: PendingConfErrors,
    diag: Diagnostics,
    modules_managed: usize,
    bfs_runs: usize,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g mut ModuleGraph, globals: &Vars) -> Self {
        let mut diag = Diagnostics::new();
        let config = DmConfig::from_globals(globals, &mut diag);
        Self {
            graph,
            config,
            managed: HashMap::new(),
            proxies: HashMap::new(),
            lib_index: HashMap::new(),
            pending: PendingConfErrors::new(),
            diag,
            modules_managed: 0,
            bfs_runs: 0,
        }
    }

    /// Resolve every root and everything reachable from it.
    ///
    /// Pending forced-pin violations are reconciled after each root:
    /// violations whose forced target is actually reachable in the root's
    /// final closure become errors, the rest are downgraded to warnings.
    pub fn run(&mut self, roots: &[ModuleId]) -> MonarkResult<()> {
        for &root in roots {
            self.traverse(root)?;
            self.reconcile_pending(root);
        }
        tracing::debug!(
            modules = self.modules_managed,
            bfs_runs = self.bfs_runs,
            "dependency management finished"
        );
        Ok(())
    }

    /// Resolve several already-run roots as one combined classpath-style
    /// unit: merged rules, merged closure, one shared conflict resolution
    /// with per-root policy reports suppressed.
    pub fn resolve_combined(&mut self, roots: &[ModuleId]) -> MonarkResult<Vec<ModuleId>> {
        for &root in roots {
            self.traverse(root)?;
        }

        let mut rules = DmRules::default();
        for &root in roots {
            self.diag.set_scope(self.graph.module(root).name.clone());
            self.config.merge_rules(
                &mut rules,
                self.graph.module(root),
                &mut self.pending,
                &mut self.diag,
            );
        }
        self.diag.clear_scope();

        let mut direct: Vec<ResolvedPeer> = Vec::new();
        for &root in roots {
            let module = self.graph.module(root);
            if self.config.is_versioned_lib(&module.dir) {
                if let Some(&target) = self.proxies.get(&root) {
                    direct.push(ResolvedPeer {
                        id: target,
                        kind: ResolveKind::Default,
                    });
                } else {
                    direct.push(ResolvedPeer {
                        id: root,
                        kind: ResolveKind::Direct,
                    });
                }
            } else {
                direct.push(ResolvedPeer {
                    id: root,
                    kind: ResolveKind::Unversioned,
                });
            }
        }
        for &root in roots {
            if let Some(record) = self.managed.get(&root) {
                direct.extend(record.direct.iter().copied());
            }
        }

        let mut closure = PeerClosure::new();
        for peer in &direct {
            if let Some(record) = self.managed.get(&peer.id) {
                let child = record.closure.exclude(
                    |i| rules.is_excluded(&self.graph.module(i).dir),
                    |i| &self.managed[&i].closure,
                );
                closure.merge(peer.id, &child, 1);
            }
        }

        self.bfs_runs += 1;
        let resolver = ConflictResolver::new(&rules, &self.config, &self.lib_index, true);
        let resolution = resolve_conflicts(
            self.graph,
            &self.managed,
            resolver,
            &direct,
            &closure,
            &mut self.diag,
        );

        let mut out = UniqVec::new();
        for &root in roots {
            out.push(root);
            if let Some(record) = self.managed.get(&root) {
                preorder_flatten(&self.managed, &record.direct, &resolution, &mut out);
            }
        }
        Ok(out.take())
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diag)
    }

    pub fn config(&self) -> &DmConfig {
        &self.config
    }

    pub fn graph(&self) -> &ModuleGraph {
        self.graph
    }

    pub fn managed_peers(&self, id: ModuleId) -> Option<&ManagedPeers> {
        self.managed.get(&id)
    }

    pub fn records(&self) -> &HashMap<ModuleId, ManagedPeers> {
        &self.managed
    }

    /// Bottom-up walk from `root`, finalizing each module after all of
    /// its manageable peers. Already-finalized modules are skipped; a
    /// peer cycle is a fatal structural error.
    fn traverse(&mut self, root: ModuleId) -> MonarkResult<()> {
        if self.managed.contains_key(&root) {
            return Ok(());
        }
        let mut stack = vec![self.open_frame(root)];
        let mut in_stack: HashSet<ModuleId> = HashSet::new();
        in_stack.insert(root);

        loop {
            let next = {
                let Some(frame) = stack.last_mut() else { break };
                if frame.next < frame.peers.len() {
                    frame.next += 1;
                    Some(frame.peers[frame.next - 1])
                } else {
                    None
                }
            };
            match next {
                Some(peer) => {
                    if self.managed.contains_key(&peer) {
                        continue;
                    }
                    if in_stack.contains(&peer) {
                        return Err(MonarkError::Graph {
                            message: format!(
                                "dependency cycle through {}",
                                self.graph.module(peer).name
                            ),
                        }
                        .into());
                    }
                    in_stack.insert(peer);
                    stack.push(self.open_frame(peer));
                }
                None => {
                    if let Some(frame) = stack.pop() {
                        in_stack.remove(&frame.id);
                        self.finish(frame);
                    }
                }
            }
        }
        Ok(())
    }

    fn open_frame(&self, id: ModuleId) -> Frame {
        let mut peers = Vec::new();
        let mut unmanageable = UniqVec::new();
        for (peer, _edge) in self.graph.direct_peers(id) {
            if self.graph.module(peer).manages_deps {
                peers.push(peer);
            } else {
                unmanageable.push(peer);
            }
        }
        Frame {
            id,
            peers,
            next: 0,
            unmanageable: unmanageable.take(),
        }
    }

    /// Finalize one module: all of its manageable peers already carry
    /// records.
    fn finish(&mut self, frame: Frame) {
        let id = frame.id;
        let (name, dir, manages, consume) = {
            let module = self.graph.module(id);
            (
                module.name.clone(),
                module.dir.clone(),
                module.manages_deps,
                module.consume_non_manageable,
            )
        };
        if !manages {
            return;
        }
        self.diag.set_scope(name);
        self.modules_managed += 1;

        if self.config.is_versioned_lib(&dir) {
            self.lib_index.insert(dir.clone(), id);
        }

        let rules = self
            .config
            .rules_for(self.graph.module(id), &mut self.pending, &mut self.diag);

        let (direct, default_proxies) = self.manage_local_peers(id, &dir, &rules);
        let closure = self.merge_closure(&direct, &rules);
        let unmanageable = frame.unmanageable;

        // The record must exist before conflict resolution: a rule may
        // point a closure member back at this very module.
        self.managed.insert(
            id,
            ManagedPeers {
                direct,
                closure,
                resolved: Vec::new(),
                resolution: HashMap::new(),
                unmanageable,
                unmanageable_closure: Vec::new(),
            },
        );

        self.bfs_runs += 1;
        let resolver = ConflictResolver::new(&rules, &self.config, &self.lib_index, false);
        let record = &self.managed[&id];
        let resolution = resolve_conflicts(
            self.graph,
            &self.managed,
            resolver,
            &record.direct,
            &record.closure,
            &mut self.diag,
        );

        let flat = {
            let mut out = UniqVec::new();
            preorder_flatten(&self.managed, &self.managed[&id].direct, &resolution, &mut out);
            out.take()
        };

        // The resolved list keeps default-version proxies in front so the
        // module -> proxy -> default-version chain stays walkable.
        let mut resolved = UniqVec::new();
        for &proxy in &default_proxies {
            resolved.push(proxy);
        }
        for &peer in &flat {
            resolved.push(peer);
        }

        let record = &self.managed[&id];
        let mut unmanageable_closure = UniqVec::new();
        for &peer in resolved.items() {
            for &unpeer in &self.managed[&peer].unmanageable_closure {
                unmanageable_closure.push(unpeer);
            }
        }
        for &unpeer in &record.unmanageable {
            unmanageable_closure.push(unpeer);
        }
        let unmanageable_closure = if consume {
            Vec::new()
        } else {
            unmanageable_closure.take()
        };

        if consume {
            // Fold the full non-manageable set into the resolved closure.
            let mut folded = UniqVec::new();
            for &unpeer in &record.unmanageable {
                folded.push(unpeer);
            }
            for &peer in resolved.items() {
                for &unpeer in &self.managed[&peer].unmanageable {
                    folded.push(unpeer);
                }
            }
            for unpeer in folded.take() {
                resolved.push(unpeer);
            }
        }

        let record = &self.managed[&id];
        let direct_var =
            vars::join_tokens(record.direct.iter().map(|p| self.graph.module(p.id).dir.as_str()));
        let closure_var =
            vars::join_tokens(flat.iter().map(|&p| self.graph.module(p).dir.as_str()));
        let artifacts_var =
            vars::join_tokens(flat.iter().map(|&p| self.graph.module(p).artifact.as_str()));
        let unmanageable_var = vars::join_tokens(
            record
                .unmanageable
                .iter()
                .map(|&p| self.graph.module(p).dir.as_str()),
        );

        {
            let module = self.graph.module_mut(id);
            module.set_var(vars::MANAGED_PEERS, direct_var);
            module.set_var(vars::MANAGED_PEERS_CLOSURE, closure_var);
            module.set_var(vars::MANAGED_PEERS_ARTIFACTS, artifacts_var);
            module.set_var(vars::NON_MANAGEABLE_PEERS, unmanageable_var);
            module.peers_complete = true;
        }

        if let Some(record) = self.managed.get_mut(&id) {
            record.resolved = resolved.take();
            record.resolution = resolution;
            record.unmanageable_closure = unmanageable_closure;
        }
        self.diag.clear_scope();
    }

    /// Classify the module's direct manageable peers.
    ///
    /// Returns the classified list and the proxy modules that resolved to
    /// a default version (kept separately for the resolved closure).
    fn manage_local_peers(
        &mut self,
        id: ModuleId,
        parent_dir: &str,
        rules: &DmRules,
    ) -> (Vec<ResolvedPeer>, Vec<ModuleId>) {
        let manageable: Vec<(ModuleId, bool)> = self
            .graph
            .direct_peers(id)
            .into_iter()
            .filter(|&(peer, _)| self.graph.module(peer).manages_deps)
            .map(|(peer, edge)| (peer, edge.ghost))
            .collect();
        let raw_count = manageable.len();

        let mut direct = Vec::new();
        let mut default_proxies = Vec::new();
        for (peer, ghost) in manageable {
            if ghost {
                continue;
            }
            let (peer_dir, peer_is_versioned) = {
                let module = self.graph.module(peer);
                (module.dir.clone(), self.config.is_versioned_lib(&module.dir))
            };

            if let Some(&default_target) = self.proxies.get(&peer) {
                match rules.rule_for_peer(&self.config, &peer_dir, true) {
                    None => {
                        let target_dir = self.graph.module(default_target).dir.clone();
                        self.diag.error(
                            DiagKind::Misconfiguration,
                            format!("dependency with default version: {target_dir}"),
                        );
                        direct.push(ResolvedPeer {
                            id: default_target,
                            kind: ResolveKind::Default,
                        });
                        default_proxies.push(peer);
                    }
                    Some(rule) => {
                        let kind = if rules.is_module_pin(&peer_dir) {
                            ResolveKind::Managed
                        } else {
                            ResolveKind::Default
                        };
                        match self.lib_index.get(rule) {
                            None => {
                                let message = format!(
                                    "dependency management replaces peer {peer_dir} with missing directory or directory without module {rule}"
                                );
                                self.diag.error(DiagKind::BadDir, message);
                            }
                            Some(&target) => {
                                if kind == ResolveKind::Default {
                                    self.diag.warn(
                                        DiagKind::Misconfiguration,
                                        format!("dependency with default version: {rule}"),
                                    );
                                }
                                direct.push(ResolvedPeer { id: target, kind });
                            }
                        }
                    }
                }
                continue;
            }

            if rules.flags.forbid_direct_peers && peer_is_versioned {
                self.diag.error(
                    DiagKind::Misconfiguration,
                    format!("peer to direct version: {peer_dir}"),
                );
            }
            direct.push(ResolvedPeer {
                id: peer,
                kind: if peer_is_versioned {
                    ResolveKind::Direct
                } else {
                    ResolveKind::Unversioned
                },
            });

            // A module whose single manageable peer is a versioned child
            // of its own directory is a proxy for that library.
            if raw_count == 1
                && !self.proxies.contains_key(&peer)
                && paths::parent(&peer_dir) == parent_dir
                && peer_is_versioned
            {
                self.proxies.insert(id, peer);
            }
        }

        if rules.flags.require_dm {
            for peer in &direct {
                if peer.kind != ResolveKind::Managed && peer.kind != ResolveKind::Unversioned {
                    let peer_dir = self.graph.module(peer.id).dir.clone();
                    self.diag.error(
                        DiagKind::Misconfiguration,
                        format!(
                            "dependency version resolved without dependency management: {peer_dir}"
                        ),
                    );
                }
            }
        }

        (direct, default_proxies)
    }

    /// Merge the direct peers' closures, applying this module's excludes
    /// to each child closure before merging.
    fn merge_closure(&self, direct: &[ResolvedPeer], rules: &DmRules) -> PeerClosure {
        let mut closure = PeerClosure::new();
        for peer in direct {
            let child = self.managed[&peer.id].closure.exclude(
                |i| rules.is_excluded(&self.graph.module(i).dir),
                |i| &self.managed[&i].closure,
            );
            closure.merge(peer.id, &child, 1);
        }
        closure
    }

    /// Settle the pending forced-pin violations once a root finishes:
    /// a violation whose forced target made it into the root's closure
    /// is a hard error, everything else is only a warning.
    fn reconcile_pending(&mut self, root: ModuleId) {
        if self.pending.is_empty() {
            return;
        }
        self.diag.set_scope(self.graph.module(root).name.clone());
        if let Some(record) = self.managed.get(&root) {
            for &peer in &record.resolved {
                let dir = self.graph.module(peer).dir.as_str();
                if let Some(message) = self.pending.remove(dir) {
                    self.diag.error(DiagKind::Misconfiguration, message);
                }
            }
        }
        for (_, message) in std::mem::take(&mut self.pending) {
            self.diag.warn(DiagKind::UserWarn, message);
        }
        self.diag.clear_scope();
    }
}

/// Push peers onto the search queue. A peer is consumed from `visited`
/// exactly once, and is enqueued only while it is logically present in
/// either the module closure or the explicit-replacement closure.
fn enqueue(
    peers: &[ResolvedPeer],
    closure: &PeerClosure,
    explicit: &PeerClosure,
    visited: &mut HashSet<ModuleId>,
    queue: &mut VecDeque<ResolvedPeer>,
) {
    for &peer in peers {
        if !visited.insert(peer.id)
            || (!closure.contains(peer.id) && !explicit.contains(peer.id))
        {
            continue;
        }
        queue.push_back(peer);
    }
}

/// Breadth-first conflict resolution over one module's closure.
///
/// Depth grows level by level so the shallowest occurrence of a library
/// wins; ties at equal depth fall to stable queue order. When a rule
/// replaces a node, the replacement's own closure is merged into an
/// explicit-replacements closure so its downstream stays traversable
/// even if the original closure excluded it.
fn resolve_conflicts(
    graph: &ModuleGraph,
    managed: &HashMap<ModuleId, ManagedPeers>,
    mut resolver: ConflictResolver<'_>,
    direct: &[ResolvedPeer],
    closure: &PeerClosure,
    diag: &mut Diagnostics,
) -> HashMap<ModuleId, ResolutionInfo> {
    if direct.is_empty() {
        return HashMap::new();
    }

    let mut explicit = PeerClosure::new();
    let mut queue: VecDeque<ResolvedPeer> = VecDeque::new();
    let mut visited: HashSet<ModuleId> = HashSet::new();
    enqueue(direct, closure, &explicit, &mut visited, &mut queue);

    let mut depth: u32 = 0;
    let mut depth_end: usize = 0;
    let mut nodes_visited: usize = 0;
    while let Some(cur) = queue.pop_front() {
        if nodes_visited == depth_end {
            depth += 1;
            depth_end += queue.len() + 1;
        }
        nodes_visited += 1;

        let peer_dir = graph.module(cur.id).dir.as_str();
        let next = match resolver.resolve(cur, peer_dir, depth, diag) {
            Some(resolved) if resolved != cur.id => {
                // Continue the walk through the replacement instead of
                // the replaced node.
                visited.insert(resolved);
                let replacement = managed[&resolved].closure.exclude(
                    |i| resolver.rules().is_excluded(&graph.module(i).dir),
                    |i| &managed[&i].closure,
                );
                explicit.merge(resolved, &replacement, 1);
                Some(resolved)
            }
            other => other,
        };
        if let Some(next) = next {
            if let Some(record) = managed.get(&next) {
                enqueue(&record.direct, closure, &explicit, &mut visited, &mut queue);
            }
        }
    }

    resolver.finalize(diag)
}

/// Flatten the resolved dependency tree in preorder over the original
/// declaration order, substituting each node with its resolution and
/// deduplicating by resolved id. Nodes the resolver never produced an
/// entry for (fully excluded) are skipped.
fn preorder_flatten<'a>(
    managed: &'a HashMap<ModuleId, ManagedPeers>,
    direct: &'a [ResolvedPeer],
    resolution: &HashMap<ModuleId, ResolutionInfo>,
    out: &mut UniqVec,
) {
    let mut stack: Vec<&'a [ResolvedPeer]> = vec![direct];
    while let Some(top) = stack.last_mut() {
        let slice: &'a [ResolvedPeer] = *top;
        let Some((&cur, rest)) = slice.split_first() else {
            stack.pop();
            continue;
        };
        *top = rest;

        let Some(info) = resolution.get(&cur.id) else {
            continue;
        };
        if !out.push(info.peer.id) {
            continue;
        }
        if let Some(record) = managed.get(&info.peer.id) {
            if !record.direct.is_empty() {
                stack.push(&record.direct);
            }
        }
    }
}

/// Insertion-ordered set of module ids.
#[derive(Debug, Default)]
struct UniqVec {
    seen: HashSet<ModuleId>,
    items: Vec<ModuleId>,
}

impl UniqVec {
    fn new() -> Self {
        Self::default()
    }

    /// `true` if the id was newly added.
    fn push(&mut self, id: ModuleId) -> bool {
        if self.seen.insert(id) {
            self.items.push(id);
            true
        } else {
            false
        }
    }

    fn items(&self) -> &[ModuleId] {
        &self.items
    }

    fn take(self) -> Vec<ModuleId> {
        self.items
    }
}
