//! Handler for `monark forced`.

use miette::Result;

use monark_resolver::diag::Diagnostics;
use monark_resolver::explain;
use monark_resolver::rules::DmConfig;

use crate::session::Session;

pub fn exec(session: &str, json: bool) -> Result<()> {
    let session = Session::load(session)?;
    let mut diag = Diagnostics::new();
    let config = DmConfig::from_globals(&session.globals, &mut diag);
    if !diag.is_empty() {
        eprint!("{diag}");
    }
    print!("{}", explain::dump_forced(&config, json)?);
    Ok(())
}
