// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{ArgMatches, Command};
use log::info;

use scint_ext::{HttpPool, NoopExtensionBuilder};
use std::sync::Arc;

use crate::error::ScintError;
use crate::preparer::Preparer;
use crate::runner;

use super::shared::{self, resolved_arg};

pub fn command() -> Command {
    Command::new("install").about("Materialize the resolved dependency set into the destination directory").arg(resolved_arg())
}

pub fn handle(args: &ArgMatches, global: &ArgMatches) -> Result<(), ScintError> {
    let bootstrap = shared::bootstrap(args, global)?;
    let preparer = Arc::new(Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder)));

    let report = runner::install(&bootstrap.resolved, &bootstrap.dest, bootstrap.layout, bootstrap.abi, &bootstrap.options, preparer)?;

    info!("{} completed, {} failed", report.summary.completed, report.summary.failed);
    for (id, reason) in &report.summary.failures {
        log::error!("job {id} failed: {reason}");
    }

    if report.summary.failed > 0 {
        return Err(ScintError::Install(format!("{} job(s) failed", report.summary.failed)));
    }
    Ok(())
}
