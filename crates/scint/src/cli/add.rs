// SPDX-License-Identifier: MIT OR Apache-2.0

//! `scint add <name> <resolved>`: same install pipeline as `scint install`.
//! Mutating the dependency manifest to record the addition is out of scope
//! (§1 excludes the manifest/lockfile text formats); the resolved set given
//! here is assumed to already reflect the addition.

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use scint_ext::{HttpPool, NoopExtensionBuilder};
use std::sync::Arc;

use crate::error::ScintError;
use crate::preparer::Preparer;
use crate::runner;

use super::shared::{self, resolved_arg};

pub fn command() -> Command {
    Command::new("add")
        .about("Install a new dependency (resolved set must already include it)")
        .arg(Arg::new("name").action(ArgAction::Set).required(true).help("package name, for logging only"))
        .arg(resolved_arg())
}

pub fn handle(args: &ArgMatches, global: &ArgMatches) -> Result<(), ScintError> {
    let name = args.get_one::<String>("name").expect("required arg");
    info!("add {name}: installing from the already-updated resolved set");

    let bootstrap = shared::bootstrap(args, global)?;
    let preparer = Arc::new(Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder)));
    let report = runner::install(&bootstrap.resolved, &bootstrap.dest, bootstrap.layout, bootstrap.abi, &bootstrap.options, preparer)?;

    if report.summary.failed > 0 {
        return Err(ScintError::Install(format!("{} job(s) failed", report.summary.failed)));
    }
    Ok(())
}
