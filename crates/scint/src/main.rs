// SPDX-License-Identifier: MIT OR Apache-2.0

//! `scint` binary entry point: installs logging, runs the CLI, and maps
//! the outcome to the stable exit codes of §6.1.

use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = scint::cli::command().get_matches();

    // The verbose flag must be read before the logger is initialized:
    // `env_logger` can only be configured once, so setting `RUST_LOG` from
    // inside `cli::process()` afterward would have no effect (§A.1).
    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match scint::cli::process(matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
