//! Human-facing rendering of resolution decisions.
//!
//! Read-only views over the engine's per-module records: a dependency
//! tree annotated with how each reference resolved, flat dumps of the
//! resolved lists, and the global forced-pin table.

use std::collections::{HashMap, HashSet};

use monark_core::graph::ModuleGraph;
use monark_core::ModuleId;
use monark_util::errors::{MonarkError, MonarkResult};

use crate::conflict::{ResolutionInfo, ResolveKind, ResolvedPeer};
use crate::resolver::ManagedPeers;
use crate::rules::DmConfig;

/// Render the resolved dependency tree of `root`.
///
/// Each reference shows its replacement when one applied, an annotation
/// for non-trivial resolution kinds, `(omitted)` for references the
/// resolver dropped, and `(*)` for subtrees already printed.
pub fn explain(
    graph: &ModuleGraph,
    records: &HashMap<ModuleId, ManagedPeers>,
    root: ModuleId,
) -> String {
    let mut out = String::new();
    out.push_str(&graph.module(root).dir);
    out.push('\n');
    let Some(record) = records.get(&root) else {
        return out;
    };
    let mut seen = HashSet::new();
    render_children(
        graph,
        records,
        &record.resolution,
        &record.direct,
        "",
        &mut seen,
        &mut out,
    );
    out
}

fn render_children(
    graph: &ModuleGraph,
    records: &HashMap<ModuleId, ManagedPeers>,
    resolution: &HashMap<ModuleId, ResolutionInfo>,
    peers: &[ResolvedPeer],
    prefix: &str,
    seen: &mut HashSet<ModuleId>,
    out: &mut String,
) {
    for (i, peer) in peers.iter().enumerate() {
        let is_last = i + 1 == peers.len();
        let connector = if is_last { "└── " } else { "├── " };
        let peer_dir = &graph.module(peer.id).dir;

        let Some(info) = resolution.get(&peer.id) else {
            out.push_str(&format!("{prefix}{connector}{peer_dir} (omitted)\n"));
            continue;
        };

        let resolved = info.peer.id;
        let mut line = format!("{prefix}{connector}{peer_dir}");
        if resolved != peer.id {
            line.push_str(&format!(" -> {}", graph.module(resolved).dir));
        }
        match info.peer.kind {
            ResolveKind::Managed => line.push_str(" (managed)"),
            ResolveKind::Default => line.push_str(" (default version)"),
            ResolveKind::Transitive => line.push_str(" (transitive)"),
            ResolveKind::Direct | ResolveKind::Unversioned => {}
        }
        if !seen.insert(resolved) {
            line.push_str(" (*)");
            out.push_str(&line);
            out.push('\n');
            continue;
        }
        out.push_str(&line);
        out.push('\n');

        if let Some(record) = records.get(&resolved) {
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            render_children(
                graph,
                records,
                resolution,
                &record.direct,
                &child_prefix,
                seen,
                out,
            );
        }
    }
}

/// Flat dump of a module's resolved peers, one directory per line.
pub fn dump_managed(
    graph: &ModuleGraph,
    records: &HashMap<ModuleId, ManagedPeers>,
    root: ModuleId,
    direct_only: bool,
) -> String {
    let Some(record) = records.get(&root) else {
        return String::new();
    };
    let ids: Vec<ModuleId> = if direct_only {
        record.direct.iter().map(|p| p.id).collect()
    } else {
        record.resolved.clone()
    };
    let mut out = String::new();
    for id in ids {
        out.push_str(&graph.module(id).dir);
        out.push('\n');
    }
    out
}

/// Dump the global forced-pin table, as text or JSON.
pub fn dump_forced(config: &DmConfig, json: bool) -> MonarkResult<String> {
    if json {
        return serde_json::to_string_pretty(config.forced_pins()).map_err(|e| {
            MonarkError::Session {
                message: format!("failed to serialize forced pins: {e}"),
            }
            .into()
        });
    }
    let mut out = String::new();
    for (lib, pinned) in config.forced_pins() {
        out.push_str(&format!("{lib} -> {pinned}\n"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monark_core::module::Module;
    use monark_core::vars::{self, Vars};

    use crate::diag::Diagnostics;
    use crate::resolver::Resolver;

    fn globals(forced: &str) -> Vars {
        let mut vars = Vars::new();
        vars.insert(vars::MANAGEABLE_PEERS_ROOTS.into(), "contrib".into());
        if !forced.is_empty() {
            vars.insert(vars::FORCED_DEPENDENCY_MANAGEMENT.into(), forced.into());
        }
        vars
    }

    #[test]
    fn tree_shows_replacements_and_duplicates() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(
            Module::new("apps/app", "apps/app")
                .manages_deps(true)
                .with_var(vars::DEPENDENCY_MANAGEMENT, "contrib/lib/2.0"),
        );
        let mid = graph.add_module(Module::new("libs/mid", "libs/mid").manages_deps(true));
        let v1 =
            graph.add_module(Module::new("contrib/lib/1.0", "contrib/lib/1.0").manages_deps(true));
        let v2 =
            graph.add_module(Module::new("contrib/lib/2.0", "contrib/lib/2.0").manages_deps(true));
        graph.add_peer(mid, v1);
        graph.add_peer(mid, v2);
        graph.add_peer(app, mid);

        let globals = globals("");
        let mut resolver = Resolver::new(&mut graph, &globals);
        resolver.run(&[app]).unwrap();

        let tree = explain(resolver.graph(), resolver.records(), app);
        assert!(tree.starts_with("apps/app\n"));
        assert!(tree.contains("└── libs/mid"));
        assert!(tree.contains("contrib/lib/1.0 -> contrib/lib/2.0 (managed)"));
        // The second reference to the winner collapses.
        assert!(tree.contains("(*)"));
    }

    #[test]
    fn dump_direct_and_closure() {
        let mut graph = ModuleGraph::new();
        let app = graph.add_module(Module::new("apps/app", "apps/app").manages_deps(true));
        let a = graph.add_module(Module::new("libs/a", "libs/a").manages_deps(true));
        let b = graph.add_module(Module::new("libs/b", "libs/b").manages_deps(true));
        graph.add_peer(app, a);
        graph.add_peer(a, b);

        let globals = globals("");
        let mut resolver = Resolver::new(&mut graph, &globals);
        resolver.run(&[app]).unwrap();

        assert_eq!(
            dump_managed(resolver.graph(), resolver.records(), app, true),
            "libs/a\n"
        );
        assert_eq!(
            dump_managed(resolver.graph(), resolver.records(), app, false),
            "libs/a\nlibs/b\n"
        );
    }

    #[test]
    fn forced_table_renders_sorted() {
        let mut globals = globals("contrib/b/2.0 contrib/a/1.0");
        globals.insert(vars::MANAGEABLE_PEERS_ROOTS.into(), "contrib".into());
        let config = DmConfig::from_globals(&globals, &mut Diagnostics::new());

        let text = dump_forced(&config, false).unwrap();
        assert_eq!(text, "contrib/a -> contrib/a/1.0\ncontrib/b -> contrib/b/2.0\n");
        let json = dump_forced(&config, true).unwrap();
        assert!(json.contains("\"contrib/a\": \"contrib/a/1.0\""));
    }
}
