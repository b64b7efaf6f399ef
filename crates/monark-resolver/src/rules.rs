//! Version-management rule compilation.
//!
//! [`DmConfig`] is the global view: the forced library-to-version pin
//! table with per-pin project exceptions, and the root path prefixes
//! under which versioned libraries are recognized at all. [`DmRules`] is
//! the per-module view derived from it: the module's own pins, its
//! exclude list, and its policy flags.

use std::collections::{BTreeMap, BTreeSet};

use monark_core::module::Module;
use monark_core::vars::{self, Vars};
use monark_util::paths;

use crate::diag::{DiagKind, Diagnostics};

/// Pending forced-pin violations, keyed by the forced `lib/version` path.
///
/// A module pin that collides with a forced pin is not reported
/// immediately: the error is held here and reconciled once a traversal
/// root completes, when it is known whether the forced pin is actually
/// reachable in the final closure.
pub type PendingConfErrors = BTreeMap<String, String>;

/// Policy flags parsed from `DEPENDENCIES_CONFIGURATION`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyFlags {
    pub forbid_direct_peers: bool,
    pub forbid_conflict: bool,
    pub forbid_conflict_dm: bool,
    pub forbid_conflict_dm_recent: bool,
    pub require_dm: bool,
}

/// Global dependency-management configuration.
#[derive(Debug, Default)]
pub struct DmConfig {
    /// Path prefixes under which versioned libraries live.
    roots: Vec<String>,
    /// Globally forced pins: library dir -> `lib/version` dir.
    forced: BTreeMap<String, String>,
    /// Per forced library, consuming-project dirs exempted from it.
    forced_exceptions: BTreeMap<String, BTreeSet<String>>,
}

impl DmConfig {
    /// Parse the global configuration variables.
    ///
    /// The exceptions variable is a flat token list of the form
    /// `FOR <lib> <project>... FOR <lib> <project>...`; malformed input
    /// produces diagnostics but never aborts parsing.
    pub fn from_globals(globals: &Vars, diag: &mut Diagnostics) -> Self {
        let mut config = DmConfig::default();

        for root in vars::tokens(globals.get(vars::MANAGEABLE_PEERS_ROOTS).map_or("", |v| v)) {
            config.roots.push(root.to_string());
        }

        for lib_with_ver in
            vars::tokens(globals.get(vars::FORCED_DEPENDENCY_MANAGEMENT).map_or("", |v| v))
        {
            config
                .forced
                .insert(paths::parent(lib_with_ver).to_string(), lib_with_ver.to_string());
        }

        enum ExceptionState {
            WaitFor,
            WaitLib,
            WaitProject { lib: String, seen: usize },
        }
        const FOR: &str = "FOR";

        let mut state = ExceptionState::WaitFor;
        for item in vars::tokens(
            globals
                .get(vars::FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS)
                .map_or("", |v| v),
        ) {
            state = match state {
                ExceptionState::WaitFor => {
                    if item == FOR {
                        ExceptionState::WaitLib
                    } else {
                        diag.error(
                            DiagKind::Misconfiguration,
                            format!(
                                "expected FOR in {} but got {item}",
                                vars::FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS
                            ),
                        );
                        ExceptionState::WaitFor
                    }
                }
                ExceptionState::WaitLib => {
                    if item == FOR {
                        diag.error(
                            DiagKind::Misconfiguration,
                            format!(
                                "no library after FOR in {}",
                                vars::FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS
                            ),
                        );
                        ExceptionState::WaitFor
                    } else {
                        if !config.forced.contains_key(item) {
                            diag.warn(
                                DiagKind::UserWarn,
                                format!(
                                    "library {item} is absent from {}, exceptions for it have no effect",
                                    vars::FORCED_DEPENDENCY_MANAGEMENT
                                ),
                            );
                        }
                        ExceptionState::WaitProject {
                            lib: item.to_string(),
                            seen: 0,
                        }
                    }
                }
                ExceptionState::WaitProject { lib, seen } => {
                    if item == FOR {
                        if seen == 0 {
                            diag.error(
                                DiagKind::Misconfiguration,
                                format!(
                                    "no exceptions after FOR {lib} in {}",
                                    vars::FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS
                                ),
                            );
                        }
                        ExceptionState::WaitLib
                    } else {
                        config
                            .forced_exceptions
                            .entry(lib.clone())
                            .or_default()
                            .insert(item.to_string());
                        ExceptionState::WaitProject {
                            lib,
                            seen: seen + 1,
                        }
                    }
                }
            };
        }

        config
    }

    /// Whether a module directory is a versioned library (lives under one
    /// of the manageable roots).
    pub fn is_versioned_lib(&self, dir: &str) -> bool {
        self.roots.iter().any(|root| paths::is_prefix_of(root, dir))
    }

    pub fn forced_pins(&self) -> &BTreeMap<String, String> {
        &self.forced
    }

    fn forced_pin_applies(&self, key: &str, module_dir: &str) -> bool {
        match self.forced_exceptions.get(key) {
            Some(projects) => !projects.contains(module_dir),
            None => true,
        }
    }

    /// Build the per-module rules record.
    pub fn rules_for(
        &self,
        module: &Module,
        pending: &mut PendingConfErrors,
        diag: &mut Diagnostics,
    ) -> DmRules {
        let mut rules = DmRules::default();
        self.merge_rules(&mut rules, module, pending, diag);
        rules
    }

    /// Fold one module's declarations into an existing rules record.
    ///
    /// Also used for multi-root resolution, where several root modules
    /// contribute declarations to one combined record.
    pub fn merge_rules(
        &self,
        rules: &mut DmRules,
        module: &Module,
        pending: &mut PendingConfErrors,
        diag: &mut Diagnostics,
    ) {
        if !module.manages_deps {
            return;
        }

        for item in vars::tokens(module.var(vars::DEPENDENCY_MANAGEMENT)) {
            if !self.roots.iter().any(|root| paths::is_prefix_of(root, item)) {
                diag.error(
                    DiagKind::BadDep,
                    format!(
                        "{} names {item}, which is outside the paths allowed for manageable dependencies",
                        vars::DEPENDENCY_MANAGEMENT
                    ),
                );
            }
            rules.add_pin(self, item, &module.dir, pending, diag);
        }

        for item in vars::tokens(module.var(vars::EXCLUDE)) {
            rules.excludes.push(item.to_string());
        }

        for item in vars::tokens(module.var(vars::DEPENDENCIES_CONFIGURATION)) {
            match item {
                vars::FORBID_DIRECT_PEERDIRS => rules.flags.forbid_direct_peers = true,
                vars::FORBID_CONFLICT => rules.flags.forbid_conflict = true,
                vars::FORBID_CONFLICT_DM => rules.flags.forbid_conflict_dm = true,
                vars::FORBID_CONFLICT_DM_RECENT => rules.flags.forbid_conflict_dm_recent = true,
                vars::REQUIRE_DM => rules.flags.require_dm = true,
                _ => diag.error(
                    DiagKind::UserErr,
                    format!(
                        "unknown {} value '{item}'; allowed: {} {} {} {} {}",
                        vars::DEPENDENCIES_CONFIGURATION,
                        vars::FORBID_DIRECT_PEERDIRS,
                        vars::FORBID_CONFLICT,
                        vars::FORBID_CONFLICT_DM,
                        vars::FORBID_CONFLICT_DM_RECENT,
                        vars::REQUIRE_DM
                    ),
                ),
            }
        }
    }
}

/// The compiled per-module rules record.
#[derive(Debug, Default)]
pub struct DmRules {
    /// Module-declared pins: library dir -> `lib/version` dir.
    lib2ver: BTreeMap<String, String>,
    /// Exclude path prefixes.
    excludes: Vec<String>,
    pub flags: PolicyFlags,
}

impl DmRules {
    /// Whether a module path falls under any exclude prefix.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excludes
            .iter()
            .any(|exclude| paths::is_prefix_of(exclude, path))
    }

    pub fn has_excludes(&self) -> bool {
        !self.excludes.is_empty()
    }

    /// Whether the rule that would apply to `peer_dir` comes from a
    /// module-declared pin rather than the global forced table.
    pub fn is_module_pin(&self, peer_dir: &str) -> bool {
        self.lib2ver.contains_key(peer_dir) || self.lib2ver.contains_key(paths::parent(peer_dir))
    }

    /// Resolution rule for one peer reference, first match wins:
    ///
    /// 1. module pin for the peer's own library path (honored even for
    ///    transitive peers unless the pinned target is excluded);
    /// 2. module pin for the peer's parent library; a *direct* peer
    ///    always overrides this pin and resolves to itself;
    /// 3. global forced pin for the exact library path;
    /// 4. global forced pin for the parent library.
    pub fn rule_for_peer<'a>(
        &'a self,
        config: &'a DmConfig,
        peer_dir: &'a str,
        is_direct: bool,
    ) -> Option<&'a str> {
        if let Some(pinned) = self.lib2ver.get(peer_dir) {
            if is_direct || !self.is_excluded(pinned) {
                return Some(pinned);
            }
        }

        let parent_dir = paths::parent(peer_dir);
        if let Some(pinned) = self.lib2ver.get(parent_dir) {
            if is_direct {
                // A direct peer to a specific version must win over the
                // module's own pin for the library.
                return Some(peer_dir);
            }
            if !self.is_excluded(pinned) {
                return Some(pinned);
            }
        }

        if let Some(forced) = config.forced.get(peer_dir) {
            return Some(forced);
        }
        if let Some(forced) = config.forced.get(parent_dir) {
            return Some(forced);
        }

        None
    }

    /// Register one `lib/version` pin declared by `module_dir`.
    ///
    /// A pin that merely repeats a forced pin records an informational
    /// note; a pin that conflicts with a forced pin is held in `pending`
    /// and is not applied (the forced pin wins), unless the forced pin is
    /// excepted for this project.
    pub fn add_pin(
        &mut self,
        config: &DmConfig,
        lib_with_ver: &str,
        module_dir: &str,
        pending: &mut PendingConfErrors,
        diag: &mut Diagnostics,
    ) {
        // A declared pin must name a version directory, not the bare
        // library: a bare library path is a proxy and cannot be pinned.
        if config.forced_pin_applies(lib_with_ver, module_dir) {
            if let Some(forced) = config.forced.get(lib_with_ver) {
                diag.warn(
                    DiagKind::UserWarn,
                    format!(
                        "proxy {lib_with_ver} used in {}, conflicts with forced dependency {forced}; declaration skipped",
                        vars::DEPENDENCY_MANAGEMENT
                    ),
                );
                return;
            }
        }
        if let Some(existing) = self.lib2ver.get(lib_with_ver) {
            diag.warn(
                DiagKind::UserWarn,
                format!(
                    "proxy {lib_with_ver} used in {}, conflicts with dependency {existing}; declaration skipped",
                    vars::DEPENDENCY_MANAGEMENT
                ),
            );
            return;
        }

        let lib = paths::parent(lib_with_ver);

        if config.forced_pin_applies(lib, module_dir) {
            if let Some(forced) = config.forced.get(lib) {
                // A later declaration for the same forced pin supersedes
                // the held violation; surface the old one as a warning.
                if let Some(previous) = pending.remove(forced.as_str()) {
                    diag.warn(DiagKind::UserWarn, previous);
                }

                if forced != lib_with_ver {
                    pending.insert(
                        forced.clone(),
                        format!(
                            "tried to overwrite forced dependency {forced} with {lib_with_ver} in {module_dir}"
                        ),
                    );
                } else {
                    diag.warn(
                        DiagKind::UserWarn,
                        format!(
                            "forced dependency {forced} redeclared with the same value in {module_dir}"
                        ),
                    );
                }
                return;
            }
        }

        self.lib2ver.insert(lib.to_string(), lib_with_ver.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals(forced: &str, exceptions: &str, roots: &str) -> Vars {
        let mut vars = Vars::new();
        vars.insert(vars::MANAGEABLE_PEERS_ROOTS.into(), roots.into());
        vars.insert(vars::FORCED_DEPENDENCY_MANAGEMENT.into(), forced.into());
        vars.insert(
            vars::FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS.into(),
            exceptions.into(),
        );
        vars
    }

    fn module(dir: &str, pins: &str, excludes: &str, policy: &str) -> Module {
        Module::new(dir, dir)
            .manages_deps(true)
            .with_var(vars::DEPENDENCY_MANAGEMENT, pins)
            .with_var(vars::EXCLUDE, excludes)
            .with_var(vars::DEPENDENCIES_CONFIGURATION, policy)
    }

    #[test]
    fn forced_table_keys_by_library() {
        let mut diag = Diagnostics::new();
        let config = DmConfig::from_globals(&globals("contrib/lib/3.0", "", "contrib"), &mut diag);
        assert_eq!(
            config.forced_pins().get("contrib/lib"),
            Some(&"contrib/lib/3.0".to_string())
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn exception_state_machine() {
        let mut diag = Diagnostics::new();
        let config = DmConfig::from_globals(
            &globals(
                "contrib/lib/3.0",
                "FOR contrib/lib apps/legacy apps/older FOR contrib/ghost apps/app",
                "contrib",
            ),
            &mut diag,
        );
        assert!(!config.forced_pin_applies("contrib/lib", "apps/legacy"));
        assert!(config.forced_pin_applies("contrib/lib", "apps/app"));
        // contrib/ghost is not forced: warning, but exceptions recorded.
        assert_eq!(diag.len(), 1);
        assert!(!diag.has_errors());
    }

    #[test]
    fn malformed_exceptions_diagnosed() {
        let mut diag = Diagnostics::new();
        let _ = DmConfig::from_globals(
            &globals("contrib/lib/3.0", "contrib/lib FOR FOR contrib/lib FOR", "contrib"),
            &mut diag,
        );
        // expected FOR; no library after FOR; no exceptions after FOR.
        assert_eq!(diag.errors().count(), 3);
    }

    #[test]
    fn policy_tokens() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("", "", "contrib"), &mut diag);
        let m = module("apps/app", "", "", "FORBID_CONFLICT REQUIRE_DM NO_SUCH_FLAG");
        let rules = config.rules_for(&m, &mut pending, &mut diag);
        assert!(rules.flags.forbid_conflict);
        assert!(rules.flags.require_dm);
        assert!(!rules.flags.forbid_conflict_dm);
        // Unknown token errors without aborting.
        assert_eq!(diag.errors().count(), 1);
    }

    #[test]
    fn pin_outside_roots_is_bad_dep() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("", "", "contrib"), &mut diag);
        let m = module("apps/app", "vendor/lib/1.0", "", "");
        let rules = config.rules_for(&m, &mut pending, &mut diag);
        assert_eq!(diag.errors().count(), 1);
        // The pin still registers; only the location is diagnosed.
        assert_eq!(
            rules.rule_for_peer(&config, "vendor/lib/2.0", false),
            Some("vendor/lib/1.0")
        );
    }

    #[test]
    fn rule_precedence() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("contrib/forced/9.0", "", "contrib"), &mut diag);
        let m = module("apps/app", "contrib/lib/2.0", "", "");
        let rules = config.rules_for(&m, &mut pending, &mut diag);

        // Exact library pin applies to the proxy path.
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/lib", true),
            Some("contrib/lib/2.0")
        );
        // Transitive versioned peer is replaced by the parent pin.
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/lib/1.0", false),
            Some("contrib/lib/2.0")
        );
        // Direct versioned peer wins over the parent pin.
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/lib/1.0", true),
            Some("contrib/lib/1.0")
        );
        // Forced pin applies when the module has none.
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/forced/1.0", false),
            Some("contrib/forced/9.0")
        );
        assert_eq!(rules.rule_for_peer(&config, "contrib/other/1.0", false), None);
    }

    #[test]
    fn excluded_pin_skipped_for_transitive() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("", "", "contrib"), &mut diag);
        let m = module("apps/app", "contrib/lib/2.0", "contrib/lib/2.0", "");
        let rules = config.rules_for(&m, &mut pending, &mut diag);
        assert_eq!(rules.rule_for_peer(&config, "contrib/lib/1.0", false), None);
        // Direct references still honor the pin.
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/lib", true),
            Some("contrib/lib/2.0")
        );
    }

    #[test]
    fn conflicting_pin_held_pending_and_not_applied() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("contrib/lib/3.0", "", "contrib"), &mut diag);
        let m = module("apps/app", "contrib/lib/2.0", "", "");
        let rules = config.rules_for(&m, &mut pending, &mut diag);

        assert_eq!(pending.get("contrib/lib/3.0").map(|s| s.contains("contrib/lib/2.0")), Some(true));
        // Forced pin wins: the module pin was not applied.
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/lib/1.0", false),
            Some("contrib/lib/3.0")
        );
    }

    #[test]
    fn repeated_forced_pin_is_note_only() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("contrib/lib/3.0", "", "contrib"), &mut diag);
        let m = module("apps/app", "contrib/lib/3.0", "", "");
        let _rules = config.rules_for(&m, &mut pending, &mut diag);
        assert!(pending.is_empty());
        assert_eq!(diag.len(), 1);
        assert!(!diag.has_errors());
    }

    #[test]
    fn excepted_project_keeps_own_pin() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(
            &globals("contrib/lib/3.0", "FOR contrib/lib apps/app", "contrib"),
            &mut diag,
        );
        let m = module("apps/app", "contrib/lib/2.0", "", "");
        let rules = config.rules_for(&m, &mut pending, &mut diag);
        assert!(pending.is_empty());
        assert_eq!(
            rules.rule_for_peer(&config, "contrib/lib/1.0", false),
            Some("contrib/lib/2.0")
        );
    }

    #[test]
    fn proxy_pin_skipped() {
        let mut diag = Diagnostics::new();
        let mut pending = PendingConfErrors::new();
        let config = DmConfig::from_globals(&globals("contrib/lib/3.0", "", "contrib"), &mut diag);
        // "contrib/lib" is a bare library (forced maps it as a key), so
        // declaring it as a pin is a proxy use and is skipped.
        let mut rules = DmRules::default();
        rules.add_pin(&config, "contrib/lib", "apps/app", &mut pending, &mut diag);
        assert!(!rules.is_module_pin("contrib/lib/1.0"));
        assert_eq!(diag.len(), 1);
        assert!(!diag.has_errors());
    }
}
