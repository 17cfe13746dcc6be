// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manifest build/read/write (§3.4, §4.3, component C3).
//!
//! The manifest is the trusted summary the validity predicate reads and the
//! promoter's sibling-file contract (§4.5) produces. Its defining guarantee
//! is bit-stability: writing the same logical manifest twice produces
//! identical bytes, independent of struct field declaration order. We get
//! this for free by serializing through [`serde_json::Value`], whose object
//! variant is a `BTreeMap` (ASCII-sorted by construction) as long as the
//! `preserve_order` feature of `serde_json` is not enabled — it isn't here.

use std::fs as std_fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

use crate::fs as scint_fs;
use crate::types::SourceDescriptor;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fs: {0}")]
    Fs(#[from] scint_fs::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Symlink,
    Dir,
}

/// One file-tree entry (§3.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct Entry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub path: PathBuf,
    pub size: u64,
    pub mode: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
}

/// Manifest-local mirror of [`SourceDescriptor`] (§3.4's `source`
/// field). Kept distinct from the resolver-facing type because the manifest
/// format is a stable on-disk contract, while `SourceDescriptor` is free to
/// gain resolver-only fields over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceInfo {
    Registry { uri: String },
    Git { uri: String, revision: Option<String> },
    Path { absolute_path: PathBuf },
    Builtin,
}

impl From<&SourceDescriptor> for SourceInfo {
    fn from(value: &SourceDescriptor) -> Self {
        match value {
            SourceDescriptor::Registry { uri } => SourceInfo::Registry { uri: uri.to_string() },
            SourceDescriptor::Git { uri, revision, .. } => SourceInfo::Git {
                uri: uri.to_string(),
                revision: revision.clone(),
            },
            SourceDescriptor::Path { absolute_path } => SourceInfo::Path {
                absolute_path: absolute_path.clone(),
            },
            SourceDescriptor::Builtin => SourceInfo::Builtin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub extensions: bool,
}

/// Per-artifact metadata: ABI, source descriptor, file list with sizes and
/// content hashes (§3.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub abi: String,
    pub full_name: String,
    pub source: SourceInfo,
    pub build: BuildInfo,
    pub files: Vec<Entry>,
}

/// Inputs to [`build`] (§4.3).
pub struct BuildParams<'a> {
    pub full_name: &'a str,
    pub gem_dir: &'a Path,
    pub abi_key: &'a str,
    pub source: &'a SourceDescriptor,
    pub extensions: bool,
}

/// Walk `gem_dir`; for each entry stat (never following symlinks), compute
/// a streamed SHA-256 for regular files, hash the link-target string for
/// symlinks, and record mode masked to `0o777` (§4.3).
pub fn build(params: &BuildParams<'_>) -> Result<Manifest, Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(params.gem_dir).into_iter().filter_map(Result::ok) {
        let rel = entry
            .path()
            .strip_prefix(params.gem_dir)
            .expect("walkdir entries are under gem_dir");
        if rel.as_os_str().is_empty() {
            continue;
        }

        let meta = std_fs::symlink_metadata(entry.path())?;
        let mode = meta.mode() & 0o777;

        let (kind, size, sha256) = if meta.file_type().is_symlink() {
            let target = std_fs::read_link(entry.path())?;
            let target_str = target.to_string_lossy().into_owned();
            (EntryKind::Symlink, target_str.len() as u64, sha256_str(&target_str))
        } else if meta.is_dir() {
            (EntryKind::Dir, 0, String::new())
        } else {
            (EntryKind::File, meta.len(), sha256_file(entry.path())?)
        };

        files.push(Entry {
            kind,
            path: rel.to_path_buf(),
            size,
            mode,
            sha256,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(Manifest {
        version: MANIFEST_VERSION,
        abi: params.abi_key.to_string(),
        full_name: params.full_name.to_string(),
        source: SourceInfo::from(params.source),
        build: BuildInfo { extensions: params.extensions },
        files,
    })
}

fn sha256_file(path: &Path) -> Result<String, io::Error> {
    let mut file = std_fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sha256_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical-ordered JSON, atomically written (§3.4, §4.3).
pub fn write(path: &Path, manifest: &Manifest) -> Result<(), Error> {
    let value = serde_json::to_value(manifest)?;
    let bytes = serde_json::to_vec_pretty(&value)?;
    scint_fs::atomic_write(path, &bytes)?;
    Ok(())
}

/// Returns `None` when the file is missing, unparseable, or carries a
/// `version` other than [`MANIFEST_VERSION`] (§4.3, §6.4).
pub fn read(path: &Path) -> Option<Manifest> {
    let bytes = std_fs::read(path).ok()?;
    let manifest: Manifest = serde_json::from_slice(&bytes).ok()?;
    if manifest.version != MANIFEST_VERSION {
        return None;
    }
    Some(manifest)
}

#[cfg(test)]
mod test {
    use super::*;
    use url::Url;

    fn sample_manifest() -> Manifest {
        Manifest {
            version: 1,
            abi: "rt-3.3.0-arm64-darwin24".into(),
            full_name: "rack-2.2.8".into(),
            source: SourceInfo::Registry {
                uri: "https://rubygems.org/gems/rack".into(),
            },
            build: BuildInfo { extensions: false },
            files: vec![
                Entry {
                    kind: EntryKind::Dir,
                    path: PathBuf::from("lib"),
                    size: 0,
                    mode: 0o755,
                    sha256: String::new(),
                },
                Entry {
                    kind: EntryKind::File,
                    path: PathBuf::from("lib/rack.rb"),
                    size: 42,
                    mode: 0o644,
                    sha256: "deadbeef".into(),
                },
            ],
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rack-2.2.8.manifest");
        let manifest = sample_manifest();

        write(&path, &manifest).unwrap();
        let read_back = read(&path).unwrap();

        assert_eq!(read_back, manifest);
    }

    #[test]
    fn reordering_top_level_fields_yields_identical_bytes() {
        // serde_json::Value's object is a BTreeMap, so the on-the-wire byte
        // sequence only depends on the logical content, never struct
        // declaration order.
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.manifest");
        let b = tmp.path().join("b.manifest");

        let manifest = sample_manifest();
        write(&a, &manifest).unwrap();
        write(&b, &manifest).unwrap();

        assert_eq!(std_fs::read(&a).unwrap(), std_fs::read(&b).unwrap());
    }

    #[test]
    fn read_rejects_wrong_version() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.manifest");
        std_fs::write(&path, br#"{"version":2,"abi":"x","full_name":"y","source":{"type":"builtin"},"build":{"extensions":false},"files":[]}"#).unwrap();

        assert!(read(&path).is_none());
    }

    #[test]
    fn read_missing_file_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read(&tmp.path().join("nope.manifest")).is_none());
    }

    #[test]
    fn build_walks_tree_and_sorts_by_path() {
        let tmp = tempfile::tempdir().unwrap();
        let gem_dir = tmp.path().join("gem");
        std_fs::create_dir_all(gem_dir.join("lib")).unwrap();
        std_fs::write(gem_dir.join("lib/z.rb"), b"z").unwrap();
        std_fs::write(gem_dir.join("lib/a.rb"), b"a").unwrap();

        let source = SourceDescriptor::Registry {
            uri: Url::parse("https://rubygems.org/gems/rack").unwrap(),
        };
        let manifest = build(&BuildParams {
            full_name: "rack-2.2.8",
            gem_dir: &gem_dir,
            abi_key: "rt-3.3.0",
            source: &source,
            extensions: false,
        })
        .unwrap();

        let paths: Vec<_> = manifest.files.iter().map(|e| e.path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }
}
