// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared bootstrap for the subcommands that drive the install pipeline
//! (`install`, `add`, `remove`): resolve configuration, build the cache
//! layout/ABI key/destination, and load the resolved set from disk.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches};

use crate::cache::layout::CacheLayout;
use crate::config::{self, FileConfig};
use crate::destination::Destination;
use crate::error::ScintError;
use crate::resolved_input;
use crate::runner::InstallOptions;
use crate::types::{AbiKey, ResolvedSpec};

/// Flags common to `install`/`add`/`remove`: a positional path to the
/// resolved-set JSON produced upstream by the (out-of-scope) resolver.
pub fn resolved_arg() -> Arg {
    Arg::new("resolved").action(ArgAction::Set).required(true).help("path to the resolved-set JSON (resolver output)")
}

pub struct Bootstrap {
    pub layout: Arc<CacheLayout>,
    pub abi: Arc<AbiKey>,
    pub dest: Destination,
    pub resolved: Vec<ResolvedSpec>,
    pub options: InstallOptions,
}

pub fn bootstrap(args: &ArgMatches, global: &ArgMatches) -> Result<Bootstrap, ScintError> {
    let file_config = FileConfig::load()?;

    let cache_root = file_config.cache_root.unwrap_or_else(config::cache_root);
    let layout = Arc::new(CacheLayout::new(cache_root));

    let abi = Arc::new(AbiKey::new(config::host_abi_key("rt-3.3.0")));

    let dest_path: PathBuf = global.get_one::<String>("path").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("scint-install"));
    let dest = Destination::new(dest_path);

    let resolved_path = PathBuf::from(args.get_one::<String>("resolved").expect("required arg"));
    let resolved = resolved_input::read(&resolved_path)?;

    let jobs = global.get_one::<usize>("jobs").copied().or(file_config.jobs).unwrap_or_else(config::default_max_workers);
    let force = global.get_flag("force");
    let without = global.get_many::<String>("without").map(|v| v.cloned().collect()).or(file_config.without).unwrap_or_default();
    let with = global.get_many::<String>("with").map(|v| v.cloned().collect()).or(file_config.with).unwrap_or_default();

    Ok(Bootstrap {
        layout,
        abi,
        dest,
        resolved,
        options: InstallOptions { jobs, force, without, with, fail_fast: true },
    })
}
