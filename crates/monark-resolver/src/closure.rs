//! Peer closures: transitive reachability with path multiplicity and
//! exclusion bookkeeping.
//!
//! A [`PeerClosure`] records every module transitively reachable from a
//! point in the graph, counting the number of distinct paths to each
//! entry and carrying an exclusion flag. A node is logically present iff
//! it exists in the closure and is not excluded; excluding it requires
//! excluding *every* path to it. Merging and excluding are pure value
//! operations with no graph traversal, and both preserve a stable
//! append-order list so iteration is deterministic.

use std::collections::HashMap;

use monark_core::ModuleId;

/// Per-entry bookkeeping: how many distinct paths reach this node, and
/// whether all of them have been excluded.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ClosureStats {
    pub paths: u32,
    pub excluded: bool,
}

/// The transitive dependency set of one module.
#[derive(Debug, Clone, Default)]
pub struct PeerClosure {
    stats: HashMap<ModuleId, ClosureStats>,
    /// First-sight append order; drives deterministic iteration.
    order: Vec<ModuleId>,
}

impl PeerClosure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `node` and everything in its `closure` into this one.
    ///
    /// `node` itself enters as a freshly reachable dependency with
    /// `multiplier` paths. For entries already present, path counts add
    /// (scaled by `multiplier`, saturating) and exclusion flags combine
    /// with logical AND: an entry stays excluded only if every
    /// contributing path excludes it. New entries append to the order
    /// list exactly once, at first sight.
    pub fn merge(&mut self, node: ModuleId, closure: &PeerClosure, multiplier: u32) {
        for &peer in &closure.order {
            let peer_stats = closure.stats[&peer];
            let scaled = ClosureStats {
                paths: peer_stats.paths.saturating_mul(multiplier),
                excluded: peer_stats.excluded,
            };
            match self.stats.entry(peer) {
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    let cur = e.get_mut();
                    cur.paths = cur.paths.saturating_add(scaled.paths);
                    cur.excluded = cur.excluded && scaled.excluded;
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(scaled);
                    self.order.push(peer);
                }
            }
        }

        match self.stats.entry(node) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let cur = e.get_mut();
                cur.paths = cur.paths.saturating_add(multiplier);
                cur.excluded = false;
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(ClosureStats {
                    paths: multiplier,
                    excluded: false,
                });
                self.order.push(node);
            }
        }
    }

    /// Return a copy of this closure with every node satisfying
    /// `predicate` marked fully excluded, propagating the exclusion to
    /// everything reachable *only* through excluded nodes.
    ///
    /// Uses exact path-count arithmetic: excluding a node charges its
    /// newly excluded path count to every downstream node in that node's
    /// own closure (`lookup`), and a downstream node flips to excluded
    /// only once its accumulated excluded-path count equals its total
    /// path count. Entries are processed in reverse append order
    /// (closest-to-leaf first) so each node's contribution is fully known
    /// before its ancestors are finalized.
    pub fn exclude<'a>(
        &self,
        predicate: impl Fn(ModuleId) -> bool,
        lookup: impl Fn(ModuleId) -> &'a PeerClosure,
    ) -> PeerClosure {
        let mut res = PeerClosure {
            stats: HashMap::with_capacity(self.stats.len()),
            order: Vec::with_capacity(self.order.len()),
        };

        let mut excluded_paths: HashMap<ModuleId, u32> = HashMap::new();
        for &id in self.order.iter().rev() {
            let mut stat = self.stats[&id];

            if predicate(id) {
                stat.excluded = true;

                let known = excluded_paths.entry(id).or_insert(0);
                let new_excludes = stat.paths - *known;
                *known = stat.paths;

                if new_excludes != 0 {
                    for (&peer, peer_stat) in &lookup(id).stats {
                        *excluded_paths.entry(peer).or_insert(0) +=
                            new_excludes.saturating_mul(peer_stat.paths);
                    }
                }
            }

            res.stats.insert(id, stat);
            res.order.push(id);
        }
        res.order.reverse();

        for (id, excludes) in excluded_paths {
            if let Some(stat) = res.stats.get_mut(&id) {
                debug_assert!(stat.paths >= excludes);
                if stat.paths == excludes {
                    stat.excluded = true;
                }
            }
        }
        res
    }

    /// `true` iff present and not excluded.
    pub fn contains(&self, id: ModuleId) -> bool {
        self.stats.get(&id).is_some_and(|s| !s.excluded)
    }

    /// `true` iff present at all, excluded or not.
    pub fn contains_any_status(&self, id: ModuleId) -> bool {
        self.stats.contains_key(&id)
    }

    pub fn stats_of(&self, id: ModuleId) -> Option<ClosureStats> {
        self.stats.get(&id).copied()
    }

    /// Entries in stable append order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, ClosureStats)> + '_ {
        self.order.iter().map(move |&id| (id, self.stats[&id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::NodeIndex;

    fn id(n: u32) -> ModuleId {
        NodeIndex::new(n as usize)
    }

    #[test]
    fn merge_counts_paths() {
        // b's closure contains c; a reaches b twice via two parents.
        let mut b = PeerClosure::new();
        b.merge(id(3), &PeerClosure::new(), 1); // b -> c

        let mut a = PeerClosure::new();
        a.merge(id(2), &b, 1);
        a.merge(id(2), &b, 1);

        assert_eq!(
            a.stats_of(id(2)),
            Some(ClosureStats {
                paths: 2,
                excluded: false
            })
        );
        assert_eq!(
            a.stats_of(id(3)),
            Some(ClosureStats {
                paths: 2,
                excluded: false
            })
        );
        // Appended once each, in first-sight order: c (from b's closure), then b.
        let order: Vec<ModuleId> = a.iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![id(3), id(2)]);
    }

    #[test]
    fn merge_multiplier_scales_paths() {
        let mut child = PeerClosure::new();
        child.merge(id(5), &PeerClosure::new(), 1);

        let mut parent = PeerClosure::new();
        parent.merge(id(4), &child, 3);
        assert_eq!(parent.stats_of(id(5)).unwrap().paths, 3);
        assert_eq!(parent.stats_of(id(4)).unwrap().paths, 3);
    }

    #[test]
    fn merge_unexcludes_on_new_path() {
        // An entry excluded in one contribution stays present if another
        // contribution reaches it unexcluded.
        let empty = PeerClosure::new();
        let mut excluded_side = PeerClosure::new();
        excluded_side.merge(id(7), &PeerClosure::new(), 1);
        let excluded_side = excluded_side.exclude(|i| i == id(7), |_| &empty);
        assert!(!excluded_side.contains(id(7)));

        let mut plain_side = PeerClosure::new();
        plain_side.merge(id(7), &PeerClosure::new(), 1);

        let mut merged = PeerClosure::new();
        merged.merge(id(1), &excluded_side, 1);
        merged.merge(id(2), &plain_side, 1);
        assert!(merged.contains(id(7)));
    }

    #[test]
    fn exclude_requires_all_paths() {
        // dep is reachable via lib (1 path) and directly (1 path).
        // Excluding lib alone must keep dep with one surviving path.
        let mut lib = PeerClosure::new();
        lib.merge(id(9), &PeerClosure::new(), 1); // lib -> dep

        let mut app = PeerClosure::new();
        app.merge(id(8), &lib, 1); // app -> lib -> dep
        app.merge(id(9), &PeerClosure::new(), 1); // app -> dep

        let excluded = app.exclude(|i| i == id(8), |i| if i == id(8) { &lib } else { unreachable!() });
        assert!(!excluded.contains(id(8)));
        assert!(excluded.contains(id(9)));
        assert!(excluded.contains_any_status(id(8)));
    }

    #[test]
    fn exclude_propagates_when_all_paths_die() {
        // dep reachable only through lib: excluding lib removes dep too.
        let mut lib = PeerClosure::new();
        lib.merge(id(9), &PeerClosure::new(), 1);

        let mut app = PeerClosure::new();
        app.merge(id(8), &lib, 1);

        let excluded = app.exclude(|i| i == id(8), |i| if i == id(8) { &lib } else { unreachable!() });
        assert!(!excluded.contains(id(8)));
        assert!(!excluded.contains(id(9)));
        assert!(excluded.contains_any_status(id(9)));
    }

    #[test]
    fn exclude_exactness_partial_paths() {
        // dep has 3 paths: two through mid, one direct. Excluding mid
        // kills 2; dep must survive.
        let empty = PeerClosure::new();
        let mut dep_only = PeerClosure::new();
        dep_only.merge(id(9), &empty, 1);

        let mut mid = PeerClosure::new();
        mid.merge(id(5), &dep_only, 1); // mid -> x -> dep
        mid.merge(id(9), &empty, 1); // mid -> dep

        let mut app = PeerClosure::new();
        app.merge(id(4), &mid, 1);
        app.merge(id(9), &empty, 1);

        assert_eq!(app.stats_of(id(9)).unwrap().paths, 3);

        let lookup = |i: ModuleId| -> &PeerClosure {
            if i == id(4) {
                &mid
            } else if i == id(5) {
                &dep_only
            } else {
                &empty
            }
        };
        let after = app.exclude(|i| i == id(4), lookup);
        assert!(!after.contains(id(4)));
        assert!(!after.contains(id(5)));
        assert!(after.contains(id(9)));
    }

    #[test]
    fn exclusion_survives_only_full_coverage() {
        // Excluding both the direct entry and the carrier removes dep.
        let empty = PeerClosure::new();
        let mut lib = PeerClosure::new();
        lib.merge(id(9), &empty, 1);

        let mut app = PeerClosure::new();
        app.merge(id(8), &lib, 1);
        app.merge(id(9), &empty, 1);

        let lookup = |i: ModuleId| -> &PeerClosure { if i == id(8) { &lib } else { &empty } };
        let after = app.exclude(|i| i == id(8) || i == id(9), lookup);
        assert!(!after.contains(id(8)));
        assert!(!after.contains(id(9)));
    }

    #[test]
    fn order_is_preserved_by_exclude() {
        let empty = PeerClosure::new();
        let mut c = PeerClosure::new();
        c.merge(id(1), &empty, 1);
        c.merge(id(2), &empty, 1);
        c.merge(id(3), &empty, 1);

        let after = c.exclude(|i| i == id(2), |_| &empty);
        let order: Vec<ModuleId> = after.iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![id(1), id(2), id(3)]);
    }
}
