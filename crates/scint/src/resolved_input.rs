// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads the resolver's output (§6.5) from a JSON file.
//!
//! Dependency resolution itself is out of scope (§1): this module only
//! covers the boundary artifact the CLI needs to drive the pipeline end to
//! end — a plain JSON array of [`ResolvedSpec`], shaped the way a resolver
//! collaborator would hand them off in process.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::types::ResolvedSpec;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("malformed resolved-set JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn read(path: &Path) -> Result<Vec<ResolvedSpec>, Error> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
