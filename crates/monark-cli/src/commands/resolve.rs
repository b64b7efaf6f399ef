//! Handler for `monark resolve`.

use miette::Result;

use monark_resolver::cache::ResolutionCache;
use monark_resolver::resolver::Resolver;
use monark_util::errors::MonarkError;

use crate::session::Session;

pub fn exec(session: &str, combined: bool, keep_going: bool, out: Option<&str>) -> Result<()> {
    let session = Session::load(session)?;
    let (mut graph, globals, roots) = session.build()?;

    let mut resolver = Resolver::new(&mut graph, &globals);
    resolver.run(&roots)?;

    if combined {
        let merged = resolver.resolve_combined(&roots)?;
        for id in merged {
            println!("{}", resolver.graph().module(id).dir);
        }
    }

    if let Some(path) = out {
        let cache = ResolutionCache::snapshot(resolver.graph(), resolver.records());
        std::fs::write(path, cache.to_json()?).map_err(MonarkError::Io)?;
        tracing::info!(path, "resolution cache written");
    }

    let diag = resolver.take_diagnostics();
    if !diag.is_empty() {
        eprint!("{diag}");
    }
    if diag.has_errors() && !keep_going {
        return Err(MonarkError::Generic {
            message: format!("resolution finished with {} errors", diag.errors().count()),
        }
        .into());
    }
    Ok(())
}
