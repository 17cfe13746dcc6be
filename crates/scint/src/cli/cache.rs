// SPDX-License-Identifier: MIT OR Apache-2.0

//! `scint cache`: minimal inspection surface named in §6.1's command list
//! but left otherwise undetailed. `gc` reports current size only — no
//! automatic eviction policy is specified anywhere in §4 — and `path`
//! prints the resolved cache root (§6.2).

use clap::{ArgMatches, Command};

use crate::config::{self, FileConfig};
use crate::error::ScintError;

pub fn command() -> Command {
    Command::new("cache")
        .about("Inspect the on-disk cache")
        .subcommand_required(true)
        .subcommand(Command::new("gc").about("Report total cache size (no eviction policy is specified)"))
        .subcommand(Command::new("path").about("Print the resolved cache root"))
}

pub fn handle(args: &ArgMatches) -> Result<(), ScintError> {
    let file_config = FileConfig::load()?;
    let cache_root = file_config.cache_root.unwrap_or_else(config::cache_root);

    match args.subcommand() {
        Some(("path", _)) => {
            println!("{}", cache_root.display());
            Ok(())
        }
        Some(("gc", _)) => {
            let size = dir_size(&cache_root);
            println!("{} bytes under {}", size, cache_root.display());
            Ok(())
        }
        _ => unreachable!(),
    }
}

fn dir_size(root: &std::path::Path) -> u64 {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
