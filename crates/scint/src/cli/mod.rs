// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI surface (§6.1). Argument parsing is a thin layer deliberately
//! excluded from the core's own invariants (§1); this module only
//! translates flags into calls against [`crate::runner`], [`crate::config`]
//! and the `scint-ext` collaborators.

mod add;
mod cache;
mod exec;
mod install;
mod remove;
mod shared;
mod version;

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::error::ScintError;

pub fn command() -> Command {
    Command::new("scint")
        .about("Dependency installer with a content- and ABI-keyed cache")
        .arg(Arg::new("verbose").short('v').long("verbose").global(true).action(ArgAction::SetTrue).help("raise the default log level to debug"))
        .arg(Arg::new("jobs").long("jobs").global(true).action(ArgAction::Set).value_parser(clap::value_parser!(usize)).help("override max_workers"))
        .arg(Arg::new("path").long("path").global(true).action(ArgAction::Set).help("override destination directory"))
        .arg(Arg::new("force").long("force").global(true).action(ArgAction::SetTrue).help("purge cached artifacts for each plan entry before acting"))
        .arg(Arg::new("without").long("without").global(true).action(ArgAction::Set).value_delimiter(',').help("group filters to exclude"))
        .arg(Arg::new("with").long("with").global(true).action(ArgAction::Set).value_delimiter(',').help("group filters to include"))
        .arg_required_else_help(true)
        .subcommand(install::command())
        .subcommand(add::command())
        .subcommand(remove::command())
        .subcommand(exec::command())
        .subcommand(cache::command())
        .subcommand(version::command())
}

/// Dispatch already-parsed argv. `install` (§6.1's default command) still
/// has to be named explicitly here: it takes a required positional (the
/// resolved set's path) that a bare, subcommand-less invocation has nowhere
/// to bind, so a missing subcommand prints help rather than guessing, the
/// same way `moss`'s root command does.
///
/// Argument parsing happens one level up, in `main`, so that the `verbose`
/// flag can be read before the logger is initialized — reading it here
/// would be too late to affect the level (§A.1).
pub fn process(matches: ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("add", args)) => add::handle(args, &matches).map_err(Error::Scint),
        Some(("remove", args)) => remove::handle(args, &matches).map_err(Error::Scint),
        Some(("exec", args)) => exec::handle(args, &matches).map_err(Error::Scint),
        Some(("cache", args)) => cache::handle(args).map_err(Error::Scint),
        Some(("version", _)) => {
            version::print();
            Ok(())
        }
        Some(("install", args)) => install::handle(args, &matches).map_err(Error::Scint),
        _ => unreachable!("arg_required_else_help guarantees a subcommand is present"),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scint(#[from] ScintError),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Scint(e) => e.exit_code(),
        }
    }
}
