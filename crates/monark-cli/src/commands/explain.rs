//! Handler for `monark explain`.

use miette::Result;

use monark_resolver::explain;
use monark_resolver::resolver::Resolver;

use crate::session::Session;

pub fn exec(session: &str, module: &str) -> Result<()> {
    let session = Session::load(session)?;
    let (mut graph, globals, roots) = session.build()?;

    let mut resolver = Resolver::new(&mut graph, &globals);
    resolver.run(&roots)?;

    let target = Session::find_module(resolver.graph(), module)?;
    print!("{}", explain::explain(resolver.graph(), resolver.records(), target));
    Ok(())
}
