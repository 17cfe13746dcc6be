// SPDX-License-Identifier: MIT OR Apache-2.0

//! `scint remove <name> <resolved>`: removes a package's materialized tree
//! from the destination directory. The resolved set passed in is assumed to
//! already exclude `name` (manifest mutation is out of scope, §1); this only
//! reconciles the destination with it.

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::error::ScintError;

use super::shared::{self, resolved_arg};

pub fn command() -> Command {
    Command::new("remove")
        .about("Uninstall a dependency no longer in the resolved set")
        .arg(Arg::new("name").action(ArgAction::Set).required(true).help("package full name, e.g. rack-2.2.8"))
        .arg(resolved_arg())
}

pub fn handle(args: &ArgMatches, global: &ArgMatches) -> Result<(), ScintError> {
    let name = args.get_one::<String>("name").expect("required arg");
    let bootstrap = shared::bootstrap(args, global)?;

    let pkg_dir = bootstrap.dest.pkg_dir(name);
    let spec_path = bootstrap.dest.spec_path(name);
    let ext_dir = bootstrap.dest.ext_dir(name);

    if !bootstrap.dest.has_package(name) {
        info!("{name} is not installed, nothing to remove");
        return Ok(());
    }

    std::fs::remove_dir_all(&pkg_dir).map_err(ScintError::from)?;
    let _ = std::fs::remove_file(&spec_path);
    let _ = std::fs::remove_dir_all(&ext_dir);

    info!("removed {name}");
    Ok(())
}
