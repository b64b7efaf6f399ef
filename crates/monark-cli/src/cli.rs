//! CLI argument definitions for Monark.
//!
//! Uses `clap` derive macros to define the full command surface. Each
//! command corresponds to a handler in the [`super::commands`] module.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "monark",
    version,
    about = "Dependency management for monorepo build graphs",
    long_about = "Monark resolves versioned library conflicts across a monorepo module \
                  graph: it builds each module's peer closure, applies pinned and forced \
                  versions, and publishes deterministic flattened dependency lists."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve every root in a session and report diagnostics
    Resolve {
        /// Path to the session file
        session: String,
        /// Resolve all roots as one combined unit and print the merged list
        #[arg(long)]
        combined: bool,
        /// Exit successfully even when diagnostics contain errors
        #[arg(long)]
        keep_going: bool,
        /// Write the resolution cache to this path
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Print a module's resolved dependency tree with replacements
    Explain {
        /// Path to the session file
        session: String,
        /// Module name to explain
        module: String,
    },

    /// Print a module's resolved dependency list, one directory per line
    Dump {
        /// Path to the session file
        session: String,
        /// Module name to dump
        module: String,
        /// Only the direct resolved peers
        #[arg(long)]
        direct: bool,
    },

    /// Print the forced dependency table of a session
    Forced {
        /// Path to the session file
        session: String,
        /// Render as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
