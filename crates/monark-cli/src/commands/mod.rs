//! Command dispatch and handler modules.

mod dump;
mod explain;
mod forced;
mod resolve;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Resolve {
            session,
            combined,
            keep_going,
            out,
        } => resolve::exec(&session, combined, keep_going, out.as_deref()),
        Command::Explain { session, module } => explain::exec(&session, &module),
        Command::Dump {
            session,
            module,
            direct,
        } => dump::exec(&session, &module, direct),
        Command::Forced { session, json } => forced::exec(&session, json),
    }
}
