// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration (§6.2): cache root resolution from
//! `SCINT_CACHE`/XDG, an optional `config.toml` overlay, and the host ABI
//! key derivation.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config.toml: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Optional `$XDG_CONFIG_HOME/scint/config.toml` overlay (§A.3): jobs,
/// group filters, and a cache-root override, mirroring the shape of the
/// `moss`'s `config::Config` (same idea, TOML instead of YAML since no
/// manifest-DSL parsing is in scope here).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub jobs: Option<usize>,
    pub without: Option<Vec<String>>,
    pub with: Option<Vec<String>>,
    pub cache_root: Option<PathBuf>,
}

impl FileConfig {
    pub fn load() -> Result<Self, Error> {
        let Some(path) = config_path() else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("scint").join("config.toml"));
        }
    }
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("scint").join("config.toml"))
}

/// Cache root resolution: `SCINT_CACHE`, else `$XDG_CACHE_HOME/scint`, else
/// `$HOME/.cache/scint` (§6.2, resolved via the `directories` crate the
/// way `moss::Installation` resolves its own root).
pub fn cache_root() -> PathBuf {
    if let Ok(dir) = env::var("SCINT_CACHE") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(dir) = env::var("XDG_CACHE_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("scint");
        }
    }
    directories::BaseDirs::new()
        .map(|dirs| dirs.cache_dir().join("scint"))
        .unwrap_or_else(|| PathBuf::from(".cache/scint"))
}

/// Default `max_workers` (§4.7.2): `min(cpu_count * 2, 50)`, falling back to
/// `4` only if the platform refuses to report a thread count at all.
pub fn default_max_workers() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    (cpus * 2).min(50)
}

/// Host ABI key: `<interpreter-marker>-<arch>-<os><major>` (§3.1's
/// example `"rt-3.3.0-arm64-darwin24"`). The interpreter version is not
/// something this core can discover on its own (it's a resolver/runtime
/// concern), so it's supplied by the caller; this only fills in the
/// platform half.
pub fn host_abi_key(interpreter_marker: &str) -> String {
    format!("{interpreter_marker}-{}-{}", host_arch(), host_os())
}

fn host_arch() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        "x86_64"
    }
    #[cfg(target_arch = "aarch64")]
    {
        "arm64"
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        env::consts::ARCH
    }
}

fn host_os() -> &'static str {
    env::consts::OS
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn host_abi_key_embeds_arch_and_os() {
        let key = host_abi_key("rt-3.3.0");
        assert!(key.starts_with("rt-3.3.0-"));
        assert!(key.ends_with(host_os()));
    }

    #[test]
    fn file_config_defaults_are_empty_when_no_file_present() {
        let config = FileConfig::default();
        assert!(config.jobs.is_none());
        assert!(config.without.is_none());
    }

    #[test]
    fn default_max_workers_is_bounded_by_fifty() {
        let workers = default_max_workers();
        assert!(workers >= 2);
        assert!(workers <= 50);
    }
}
