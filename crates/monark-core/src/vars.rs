//! Declaration variable names and token iteration.
//!
//! The host build system communicates with the engine through string
//! variables: space-separated token lists that have already been
//! macro-expanded. This module fixes the variable names shared by the
//! engine and the host, and provides the one tokenizer everything uses.

use std::collections::BTreeMap;

/// A set of named string variables, ordered for deterministic iteration.
pub type Vars = BTreeMap<String, String>;

// Global configuration vars.
pub const MANAGEABLE_PEERS_ROOTS: &str = "MANAGEABLE_PEERS_ROOTS";
pub const FORCED_DEPENDENCY_MANAGEMENT: &str = "FORCED_DEPENDENCY_MANAGEMENT";
pub const FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS: &str =
    "FORCED_DEPENDENCY_MANAGEMENT_EXCEPTIONS";

// Per-module input vars.
pub const DEPENDENCY_MANAGEMENT: &str = "DEPENDENCY_MANAGEMENT";
pub const EXCLUDE: &str = "EXCLUDE";
pub const DEPENDENCIES_CONFIGURATION: &str = "DEPENDENCIES_CONFIGURATION";

// Per-module output vars written back by the engine.
pub const MANAGED_PEERS: &str = "MANAGED_PEERS";
pub const MANAGED_PEERS_CLOSURE: &str = "MANAGED_PEERS_CLOSURE";
pub const MANAGED_PEERS_ARTIFACTS: &str = "MANAGED_PEERS_ARTIFACTS";
pub const NON_MANAGEABLE_PEERS: &str = "NON_MANAGEABLE_PEERS";

// Policy tokens accepted in DEPENDENCIES_CONFIGURATION.
pub const FORBID_DIRECT_PEERDIRS: &str = "FORBID_DIRECT_PEERDIRS";
pub const FORBID_CONFLICT: &str = "FORBID_CONFLICT";
pub const FORBID_CONFLICT_DM: &str = "FORBID_CONFLICT_DM";
pub const FORBID_CONFLICT_DM_RECENT: &str = "FORBID_CONFLICT_DM_RECENT";
pub const REQUIRE_DM: &str = "REQUIRE_DM";

/// Iterate the tokens of a space-separated declaration value.
pub fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split_ascii_whitespace()
}

/// Join items into a space-separated declaration value.
pub fn join_tokens<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for item in items {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(item.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_skip_blank_runs() {
        let got: Vec<&str> = tokens("  a b   c ").collect();
        assert_eq!(got, ["a", "b", "c"]);
        assert_eq!(tokens("").count(), 0);
    }

    #[test]
    fn join_round_trip() {
        assert_eq!(join_tokens(["a", "b", "c"]), "a b c");
        assert_eq!(join_tokens(Vec::<String>::new()), "");
    }
}
