// SPDX-License-Identifier: MIT OR Apache-2.0

//! `scint exec -- <command> [args...]`: reads the runtime lock (§6.5) and
//! adjusts the child process's load-path environment variable before
//! spawning it.

use clap::{Arg, ArgAction, ArgMatches, Command};

use scint_ext::runtime::read_runtime_lock;

use crate::error::ScintError;

pub fn command() -> Command {
    Command::new("exec")
        .about("Run a command with the installed load path applied")
        .arg(Arg::new("command").action(ArgAction::Set).num_args(1..).required(true).trailing_var_arg(true).help("command and arguments to run"))
}

pub fn handle(args: &ArgMatches, global: &ArgMatches) -> Result<(), ScintError> {
    let dest_path = global
        .get_one::<String>("path")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("scint-install"));

    let lock_path = dest_path.join("scint.runtime.lock");
    let lock = read_runtime_lock(&lock_path)?;
    let overlay = lock.env_overlay("RUBYLIB");

    let parts: Vec<&String> = args.get_many::<String>("command").expect("required arg").collect();
    let (program, rest) = parts.split_first().expect("clap enforces at least one value");

    let status = std::process::Command::new(program)
        .args(rest)
        .envs(overlay)
        .status()
        .map_err(ScintError::from)?;

    std::process::exit(status.code().unwrap_or(1));
}
