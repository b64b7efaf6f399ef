//! Per-library conflict resolution.
//!
//! During the breadth-first walk of a module's closure, every versioned
//! peer reference funnels through a [`ConflictResolver`]. The resolver
//! keeps one record per library: the first reference at the smallest
//! depth wins unless a rule replaces it, and later references to other
//! versions of the same library collapse into the winner while their
//! versions are remembered for the policy checks run at
//! [`ConflictResolver::finalize`].

use std::collections::{BTreeMap, HashMap};

use monark_core::ModuleId;
use monark_util::paths;

use crate::diag::{DiagKind, Diagnostics};
use crate::rules::{DmConfig, DmRules};
use crate::version;

/// How a peer entered the resolved closure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResolveKind {
    /// Not a versioned library; never participates in conflicts.
    Unversioned,
    /// A proxy reference with no applicable rule took the default version.
    Default,
    /// Declared directly with an explicit version.
    Direct,
    /// Chosen by a module pin or a forced pin.
    Managed,
    /// Reached transitively with no rule applying.
    Transitive,
}

/// A peer together with the way it resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPeer {
    pub id: ModuleId,
    pub kind: ResolveKind,
}

/// Final per-node resolution: the winner and the smallest depth at which
/// the node was reached.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionInfo {
    pub min_depth: u32,
    pub peer: ResolvedPeer,
}

/// Per-library bookkeeping while the walk is in flight.
#[derive(Debug)]
struct ResolutionRecord {
    choice: ResolvedPeer,
    version: String,
    /// Versions that collided with the choice, winner first. Only
    /// populated when a policy flag makes the collision reportable.
    conflict_versions: Vec<String>,
}

/// Resolves version conflicts for one module's closure walk.
pub struct ConflictResolver<'a> {
    rules: &'a DmRules,
    config: &'a DmConfig,
    /// Versioned-library dir -> module id, for rule targets.
    lib_index: &'a HashMap<String, ModuleId>,
    accumulated: HashMap<ModuleId, ResolutionInfo>,
    /// Keyed by library dir; ordered so finalize reports deterministically.
    resolutions: BTreeMap<String, ResolutionRecord>,
    /// Combined multi-root runs skip the policy checks: each root already
    /// ran them for its own closure.
    skip_policy_checks: bool,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(
        rules: &'a DmRules,
        config: &'a DmConfig,
        lib_index: &'a HashMap<String, ModuleId>,
        skip_policy_checks: bool,
    ) -> Self {
        Self {
            rules,
            config,
            lib_index,
            accumulated: HashMap::new(),
            resolutions: BTreeMap::new(),
            skip_policy_checks,
        }
    }

    pub fn rules(&self) -> &DmRules {
        self.rules
    }

    /// Resolve one peer reference seen at `depth`.
    ///
    /// Returns the module the reference resolved to, or `None` when the
    /// library already has a winner and this reference collapsed into it.
    pub fn resolve(
        &mut self,
        cur: ResolvedPeer,
        peer_dir: &str,
        depth: u32,
        diag: &mut Diagnostics,
    ) -> Option<ModuleId> {
        if cur.kind == ResolveKind::Unversioned {
            return Some(self.accept(cur.id, cur, depth));
        }

        let lib_name = paths::parent(peer_dir);
        let lib_ver = paths::basename(peer_dir);

        if let Some(record) = self.resolutions.get_mut(lib_name) {
            let choice_managed = record.choice.kind == ResolveKind::Managed;
            if (self.rules.flags.forbid_conflict && !choice_managed)
                || ((self.rules.flags.forbid_conflict_dm
                    || self.rules.flags.forbid_conflict_dm_recent)
                    && choice_managed)
            {
                if record.conflict_versions.is_empty() {
                    record.conflict_versions.push(record.version.clone());
                }
                record.conflict_versions.push(lib_ver.to_string());
            }
            if choice_managed {
                // Every collapsed version keeps a replacement entry: the
                // first node in flattening order may differ from the first
                // one the breadth-first walk saw.
                let choice = record.choice;
                self.accumulated.entry(cur.id).or_insert(ResolutionInfo {
                    min_depth: depth,
                    peer: choice,
                });
            }
            return None;
        }

        let record = match self.find_explicit_resolution(peer_dir, depth == 1, diag) {
            None => ResolutionRecord {
                choice: ResolvedPeer {
                    id: cur.id,
                    kind: if cur.kind == ResolveKind::Managed {
                        ResolveKind::Transitive
                    } else {
                        cur.kind
                    },
                },
                version: lib_ver.to_string(),
                conflict_versions: Vec::new(),
            },
            Some((target, dm_ver)) => {
                let mut conflict_versions = Vec::new();
                if (self.rules.flags.forbid_conflict_dm
                    || self.rules.flags.forbid_conflict_dm_recent)
                    && cur.id != target
                {
                    conflict_versions.push(lib_ver.to_string());
                }
                ResolutionRecord {
                    choice: ResolvedPeer {
                        id: target,
                        kind: ResolveKind::Managed,
                    },
                    version: dm_ver,
                    conflict_versions,
                }
            }
        };
        let choice = record.choice;
        self.resolutions.insert(lib_name.to_string(), record);
        Some(self.accept(cur.id, choice, depth))
    }

    /// Run the policy checks and hand back the accumulated resolution map.
    pub fn finalize(self, diag: &mut Diagnostics) -> HashMap<ModuleId, ResolutionInfo> {
        if !self.skip_policy_checks && self.rules.flags.forbid_conflict {
            for (lib, record) in &self.resolutions {
                if record.conflict_versions.is_empty()
                    || record.choice.kind == ResolveKind::Managed
                {
                    continue;
                }
                diag.error(
                    DiagKind::Misconfiguration,
                    format!(
                        "auto resolved versions conflict: {} ({}/{} chosen)",
                        record.conflict_versions.join(", "),
                        lib,
                        record.version
                    ),
                );
            }
        }

        if !self.skip_policy_checks && self.rules.flags.forbid_conflict_dm {
            for (lib, record) in &self.resolutions {
                if record.conflict_versions.is_empty()
                    || record.choice.kind != ResolveKind::Managed
                {
                    continue;
                }
                diag.error(
                    DiagKind::Misconfiguration,
                    format!(
                        "different library versions in peers: {} ({}/{} required by dependency management)",
                        record.conflict_versions.join(", "),
                        lib,
                        record.version
                    ),
                );
            }
        }

        if !self.skip_policy_checks && self.rules.flags.forbid_conflict_dm_recent {
            for (lib, record) in &self.resolutions {
                if record.choice.kind != ResolveKind::Managed {
                    continue;
                }
                let newer: Vec<&str> = record
                    .conflict_versions
                    .iter()
                    .map(String::as_str)
                    .filter(|item| version::version_less(&record.version, item))
                    .collect();
                if newer.is_empty() {
                    continue;
                }
                diag.error(
                    DiagKind::Misconfiguration,
                    format!(
                        "more recent library versions in peers: {} ({}/{} required by dependency management)",
                        newer.join(", "),
                        lib,
                        record.version
                    ),
                );
            }
        }

        self.accumulated
    }

    /// Look up the rule-chosen replacement for a versioned peer.
    ///
    /// Returns the target module and the rule's version. A rule whose
    /// target directory holds no module is diagnosed and treated as no
    /// rule at all.
    fn find_explicit_resolution(
        &self,
        peer_dir: &str,
        is_direct: bool,
        diag: &mut Diagnostics,
    ) -> Option<(ModuleId, String)> {
        let rule = self.rules.rule_for_peer(self.config, peer_dir, is_direct)?;
        match self.lib_index.get(rule) {
            Some(&target) => Some((target, paths::basename(rule).to_string())),
            None => {
                if paths::parent(peer_dir) == paths::parent(rule) {
                    // Same library, different version: the reference is
                    // blocked by a forced pin whose version is absent.
                    let sort = if is_direct { "direct" } else { "transitive" };
                    diag.error(
                        DiagKind::Misconfiguration,
                        format!(
                            "{sort} peer {peer_dir} tries to overwrite forced dependency {rule}"
                        ),
                    );
                } else {
                    diag.error(
                        DiagKind::BadDir,
                        format!(
                            "dependency management replaces peer {peer_dir} with missing directory or directory without module {rule}"
                        ),
                    );
                }
                None
            }
        }
    }

    /// Record the winner for `conflict_id` and return the winning node.
    ///
    /// A managed winner also records a trivial self-replacement so the
    /// flattening pass finds it regardless of which reference it meets
    /// first.
    fn accept(&mut self, conflict_id: ModuleId, resolution: ResolvedPeer, depth: u32) -> ModuleId {
        let info = *self.accumulated.entry(conflict_id).or_insert(ResolutionInfo {
            min_depth: depth,
            peer: resolution,
        });
        if info.peer.kind == ResolveKind::Managed {
            self.accumulated.entry(info.peer.id).or_insert(info);
        }
        info.peer.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monark_core::module::Module;
    use monark_core::vars::{self, Vars};
    use petgraph::graph::NodeIndex;

    use crate::rules::PendingConfErrors;

    fn id(n: u32) -> ModuleId {
        NodeIndex::new(n as usize)
    }

    fn config(forced: &str) -> DmConfig {
        let mut globals = Vars::new();
        globals.insert(vars::MANAGEABLE_PEERS_ROOTS.into(), "contrib".into());
        globals.insert(vars::FORCED_DEPENDENCY_MANAGEMENT.into(), forced.into());
        DmConfig::from_globals(&globals, &mut Diagnostics::new())
    }

    fn rules_with(config: &DmConfig, pins: &str, policy: &str) -> DmRules {
        let module = Module::new("app", "apps/app")
            .manages_deps(true)
            .with_var(vars::DEPENDENCY_MANAGEMENT, pins)
            .with_var(vars::DEPENDENCIES_CONFIGURATION, policy);
        config.rules_for(&module, &mut PendingConfErrors::new(), &mut Diagnostics::new())
    }

    fn peer(n: u32, kind: ResolveKind) -> ResolvedPeer {
        ResolvedPeer { id: id(n), kind }
    }

    #[test]
    fn unversioned_always_accepts() {
        let config = config("");
        let rules = rules_with(&config, "", "");
        let libs = HashMap::new();
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        let r = resolver.resolve(peer(1, ResolveKind::Unversioned), "libs/plain", 1, &mut diag);
        assert_eq!(r, Some(id(1)));
        // A second unversioned reference resolves again, no conflict.
        let r = resolver.resolve(peer(1, ResolveKind::Unversioned), "libs/plain", 2, &mut diag);
        assert_eq!(r, Some(id(1)));
        assert!(diag.is_empty());
    }

    #[test]
    fn first_version_wins_and_repeat_collapses() {
        let config = config("");
        let rules = rules_with(&config, "", "");
        let libs = HashMap::new();
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        let first = resolver.resolve(peer(1, ResolveKind::Direct), "contrib/lib/1.0", 1, &mut diag);
        assert_eq!(first, Some(id(1)));
        let second =
            resolver.resolve(peer(2, ResolveKind::Transitive), "contrib/lib/2.0", 2, &mut diag);
        assert_eq!(second, None);

        let map = resolver.finalize(&mut diag);
        assert_eq!(map[&id(1)].peer.id, id(1));
        assert_eq!(map[&id(1)].peer.kind, ResolveKind::Direct);
        // The loser records no replacement when the winner is not managed.
        assert!(!map.contains_key(&id(2)));
        assert!(diag.is_empty());
    }

    #[test]
    fn forbid_conflict_reports_auto_resolution() {
        let config = config("");
        let rules = rules_with(&config, "", "FORBID_CONFLICT");
        let libs = HashMap::new();
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        resolver.resolve(peer(1, ResolveKind::Direct), "contrib/lib/1.0", 1, &mut diag);
        resolver.resolve(peer(2, ResolveKind::Transitive), "contrib/lib/2.0", 2, &mut diag);
        resolver.resolve(peer(3, ResolveKind::Transitive), "contrib/lib/3.0", 2, &mut diag);
        resolver.finalize(&mut diag);

        assert_eq!(diag.errors().count(), 1);
        let msg = diag.to_string();
        assert!(msg.contains("1.0, 2.0, 3.0"));
        assert!(msg.contains("contrib/lib/1.0 chosen"));
    }

    #[test]
    fn pin_replaces_and_records_trivial_replacement() {
        let config = config("");
        let rules = rules_with(&config, "contrib/lib/2.0", "");
        let mut libs = HashMap::new();
        libs.insert("contrib/lib/2.0".to_string(), id(2));
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        let r = resolver.resolve(peer(1, ResolveKind::Transitive), "contrib/lib/1.0", 2, &mut diag);
        assert_eq!(r, Some(id(2)));

        let map = resolver.finalize(&mut diag);
        assert_eq!(map[&id(1)].peer.id, id(2));
        assert_eq!(map[&id(1)].peer.kind, ResolveKind::Managed);
        // The replacement target resolves to itself.
        assert_eq!(map[&id(2)].peer.id, id(2));
        assert!(diag.is_empty());
    }

    #[test]
    fn direct_peer_overrides_parent_pin() {
        let config = config("");
        let rules = rules_with(&config, "contrib/lib/2.0", "");
        let mut libs = HashMap::new();
        libs.insert("contrib/lib/1.0".to_string(), id(1));
        libs.insert("contrib/lib/2.0".to_string(), id(2));
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        // A direct peer to a specific version resolves to itself even
        // though the module pins the library to another version.
        let r = resolver.resolve(peer(1, ResolveKind::Direct), "contrib/lib/1.0", 1, &mut diag);
        assert_eq!(r, Some(id(1)));
        let map = resolver.finalize(&mut diag);
        assert_eq!(map[&id(1)].peer.id, id(1));
        assert_eq!(map[&id(1)].peer.kind, ResolveKind::Managed);
        assert!(diag.is_empty());
    }

    #[test]
    fn forbid_conflict_dm_reports_managed_collisions() {
        let config = config("");
        let rules = rules_with(&config, "contrib/lib/2.0", "FORBID_CONFLICT_DM");
        let mut libs = HashMap::new();
        libs.insert("contrib/lib/2.0".to_string(), id(2));
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        // The first transitive reference is replaced by the pin; its
        // original version counts as a collision because the target
        // differs. A later version of the same library joins the list.
        resolver.resolve(peer(1, ResolveKind::Transitive), "contrib/lib/1.0", 2, &mut diag);
        resolver.resolve(peer(3, ResolveKind::Transitive), "contrib/lib/3.0", 2, &mut diag);
        let map = resolver.finalize(&mut diag);

        // Both collapsed references carry replacement entries.
        assert_eq!(map[&id(1)].peer.id, id(2));
        assert_eq!(map[&id(3)].peer.id, id(2));
        assert_eq!(diag.errors().count(), 1);
        let msg = diag.to_string();
        assert!(msg.contains("1.0, 3.0"));
        assert!(msg.contains("required by dependency management"));
    }

    #[test]
    fn recent_check_only_reports_newer_versions() {
        let config = config("");
        let rules = rules_with(&config, "contrib/lib/2.0", "FORBID_CONFLICT_DM_RECENT");
        let mut libs = HashMap::new();
        libs.insert("contrib/lib/2.0".to_string(), id(2));
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        resolver.resolve(peer(1, ResolveKind::Transitive), "contrib/lib/1.0", 2, &mut diag);
        resolver.resolve(peer(3, ResolveKind::Transitive), "contrib/lib/2.10", 3, &mut diag);
        resolver.finalize(&mut diag);

        assert_eq!(diag.errors().count(), 1);
        let msg = diag.to_string();
        // 1.0 is older than the pinned 2.0 and must not be reported.
        assert!(msg.contains("more recent library versions in peers: 2.10"));
        assert!(!msg.contains("1.0,"));
    }

    #[test]
    fn missing_rule_target_is_diagnosed_and_ignored() {
        let config = config("contrib/lib/9.0");
        let rules = rules_with(&config, "", "");
        let libs = HashMap::new();
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        // Forced to 9.0 but no module exists there: Misconfiguration, and
        // the original reference stands.
        let r = resolver.resolve(peer(1, ResolveKind::Direct), "contrib/lib/1.0", 1, &mut diag);
        assert_eq!(r, Some(id(1)));
        assert_eq!(diag.errors().count(), 1);
        assert!(diag.to_string().contains("forced dependency"));
    }

    #[test]
    fn managed_reference_without_rule_becomes_transitive() {
        let config = config("");
        let rules = rules_with(&config, "", "");
        let libs = HashMap::new();
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, false);

        let r = resolver.resolve(peer(5, ResolveKind::Managed), "contrib/lib/2.0", 2, &mut diag);
        assert_eq!(r, Some(id(5)));
        let map = resolver.finalize(&mut diag);
        assert_eq!(map[&id(5)].peer.kind, ResolveKind::Transitive);
    }

    #[test]
    fn skip_policy_checks_suppresses_reports() {
        let config = config("");
        let rules = rules_with(&config, "", "FORBID_CONFLICT");
        let libs = HashMap::new();
        let mut diag = Diagnostics::new();
        let mut resolver = ConflictResolver::new(&rules, &config, &libs, true);

        resolver.resolve(peer(1, ResolveKind::Direct), "contrib/lib/1.0", 1, &mut diag);
        resolver.resolve(peer(2, ResolveKind::Transitive), "contrib/lib/2.0", 2, &mut diag);
        resolver.finalize(&mut diag);
        assert!(diag.is_empty());
    }
}
