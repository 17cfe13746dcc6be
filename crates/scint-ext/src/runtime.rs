// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime setup collaborator (§6.5): writes the serialized lock blob
//! that records every installed package's load path, and reconstructs an
//! interpreter child process's environment from it for the `exec` CLI
//! command (§6.1).

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// One entry in the runtime lock: a package's full name and the directory
/// the interpreter should add to its load path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPathEntry {
    pub full_name: String,
    pub load_path: PathBuf,
}

/// The serialized blob §6.5 calls "a serialized lock blob produced at
/// install time".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeLock {
    pub entries: Vec<LoadPathEntry>,
}

impl RuntimeLock {
    /// Environment variable overlay to apply before spawning the
    /// interpreter (`exec` CLI command): the ecosystem convention of a
    /// colon-joined load-path variable.
    pub fn env_overlay(&self, var_name: &str) -> BTreeMap<String, String> {
        let joined = self
            .entries
            .iter()
            .map(|e| e.load_path.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":");

        let mut env = BTreeMap::new();
        env.insert(var_name.to_string(), joined);
        env
    }
}

/// Write the runtime lock atomically (sibling temp + rename), matching the
/// manifest writer's atomicity guarantee.
pub fn write_runtime_lock(path: &Path, lock: &RuntimeLock) -> Result<(), RuntimeError> {
    let bytes = serde_json::to_vec_pretty(lock)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_runtime_lock(path: &Path) -> Result<RuntimeLock, RuntimeError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
