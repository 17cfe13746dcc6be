// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache layout (§3.2, §4.2, component C2): pure path algebra mapping
//! `(package id, abi key, source id)` to canonical directories under a cache
//! root, modelled on `moss::Installation`'s path helpers
//! (`cache_path`, `db_path`, `staging_path`, ...).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::fs::DirCache;
use crate::types::{AbiKey, PackageId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("path escapes cache root: {0}")]
    Escape(String),
}

/// Pure path algebra over the cache root, plus a process-wide memo of
/// directories already ensured to exist (§4.2's "mutex-protected cache
/// of directories already materialized").
#[derive(Debug)]
pub struct CacheLayout {
    root: PathBuf,
    dirs: DirCache,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: DirCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure `path` exists, verifying it is a descendant of `root` first.
    /// Every path-producing method below is constructed purely from
    /// sanitized components, but this final check is the §3.3
    /// invariant made load-bearing rather than assumed.
    fn ensure_dir(&self, path: PathBuf) -> Result<PathBuf, Error> {
        self.guard(&path)?;
        self.dirs.mkdir_p(&path)?;
        Ok(path)
    }

    fn guard(&self, path: &Path) -> Result<(), Error> {
        if path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(Error::Escape(path.display().to_string()))
        }
    }

    /// Public root-containment check (§4.5 step 1): the promoter validates
    /// both its staging path and its target path lie within the cache root
    /// before moving anything.
    pub fn guard_within_root(&self, path: &Path) -> Result<(), Error> {
        self.guard(path)
    }

    // -- inbound --------------------------------------------------------

    pub fn inbound_gems_dir(&self) -> PathBuf {
        self.root.join("inbound").join("gems")
    }

    pub fn inbound_gem_path(&self, full_name: &str) -> PathBuf {
        self.inbound_gems_dir().join(format!("{full_name}.gem"))
    }

    pub fn inbound_gits_dir(&self) -> PathBuf {
        self.root.join("inbound").join("gits")
    }

    pub fn inbound_git_path(&self, repo_slug: &str) -> PathBuf {
        self.inbound_gits_dir().join(repo_slug)
    }

    // -- assembling -------------------------------------------------------

    pub fn assembling_dir(&self, abi: &AbiKey, full_name: &str) -> PathBuf {
        self.root.join("assembling").join(abi.as_str()).join(full_name)
    }

    /// Unique scratch path for an in-flight assemble (§4.8: extracted
    /// then atomically moved into place).
    pub fn assembling_scratch_path(&self, abi: &AbiKey, full_name: &str) -> PathBuf {
        let pid = std::process::id();
        let tid = format!("{:?}", std::thread::current().id())
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>();
        self.root
            .join("assembling")
            .join(abi.as_str())
            .join(format!("{full_name}.{pid}.{tid}.tmp"))
    }

    // -- cached -----------------------------------------------------------

    pub fn cached_abi_dir(&self, abi: &AbiKey) -> PathBuf {
        self.root.join("cached").join(abi.as_str())
    }

    pub fn cached_dir(&self, abi: &AbiKey, full_name: &str) -> PathBuf {
        self.cached_abi_dir(abi).join(full_name)
    }

    pub fn cached_spec_path(&self, abi: &AbiKey, full_name: &str) -> PathBuf {
        self.cached_abi_dir(abi).join(format!("{full_name}.spec"))
    }

    pub fn cached_manifest_path(&self, abi: &AbiKey, full_name: &str) -> PathBuf {
        self.cached_abi_dir(abi).join(format!("{full_name}.manifest"))
    }

    pub fn cached_dir_for(&self, id: &PackageId, abi: &AbiKey) -> PathBuf {
        self.cached_dir(abi, &id.full_name())
    }

    // -- index / locks / staging / install-env ----------------------------

    pub fn index_dir(&self, source_slug: &str) -> PathBuf {
        self.root.join("index").join(source_slug)
    }

    pub fn promotion_lock_path(&self, lock_key: &str) -> PathBuf {
        self.root.join("locks").join("promotion").join(format!("{}.lock", sanitize_lock_key(lock_key)))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn install_env_dir(&self) -> PathBuf {
        self.root.join("install-env")
    }

    /// Ensure a directory exists, returning the same path for chaining.
    pub fn ensure(&self, path: PathBuf) -> Result<PathBuf, Error> {
        self.ensure_dir(path)
    }
}

/// Replace any byte outside `[0-9A-Za-z._-]` with `_` (§4.5 step 2).
pub fn sanitize_lock_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// Derive a slug for a remote URI: normalized-host/path form when it is
/// human-decodable and unambiguous, otherwise a truncated SHA-256 (§3.2).
pub fn slug_for_uri(uri: &str) -> String {
    let normalized = normalize_uri(uri);
    let candidate: String = normalized
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    // Human-decodable slugs are capped to avoid absurdly long path segments;
    // beyond that (or when the candidate collapsed to something degenerate)
    // fall back to a content-addressed slug.
    if !candidate.is_empty() && candidate.len() <= 120 {
        candidate
    } else {
        truncated_sha256(&normalized)
    }
}

fn normalize_uri(uri: &str) -> String {
    let mut s = uri.trim_end_matches('/').to_string();
    if let Some(stripped) = s.strip_suffix(".git") {
        s = stripped.to_string();
    }
    s = s.replace(".git/", "/");

    if let Ok(mut parsed) = url::Url::parse(&s) {
        let host = parsed.host_str().map(str::to_lowercase);
        if let Some(host) = host {
            let _ = parsed.set_host(Some(&host));
        }
        parsed.to_string()
    } else {
        s.to_lowercase()
    }
}

/// Truncated (16 hex char) SHA-256 of `input` (§3.2).
pub fn truncated_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    fn layout() -> (tempfile::TempDir, CacheLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        (tmp, layout)
    }

    #[test]
    fn all_paths_are_descendants_of_root() {
        let (_tmp, layout) = layout();
        let abi = AbiKey::new("rt-3.3.0-arm64-darwin24");

        let paths = [
            layout.inbound_gem_path("rack-2.2.8"),
            layout.inbound_git_path("github.com_rails_rails"),
            layout.assembling_dir(&abi, "rack-2.2.8"),
            layout.cached_dir(&abi, "rack-2.2.8"),
            layout.cached_spec_path(&abi, "rack-2.2.8"),
            layout.cached_manifest_path(&abi, "rack-2.2.8"),
            layout.index_dir("rubygems.org"),
            layout.promotion_lock_path("rack-2.2.8"),
            layout.staging_dir(),
            layout.install_env_dir(),
        ];

        for path in paths {
            assert!(path.starts_with(layout.root()), "{path:?} escapes root");
        }
    }

    #[test]
    fn sanitize_lock_key_replaces_unsafe_bytes() {
        assert_eq!(sanitize_lock_key("rack/2.2.8!"), "rack_2.2.8_");
    }

    #[test]
    fn slug_for_uri_strips_git_suffix_and_lowercases_host() {
        let slug = slug_for_uri("https://GitHub.com/rails/rails.git/");
        assert!(slug.contains("github.com"));
        assert!(!slug.to_lowercase().contains(".git"));
    }

    #[test]
    fn truncated_sha256_is_16_hex_chars() {
        let digest = truncated_sha256("https://example.com/repo");
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ensure_creates_directory() {
        let (_tmp, layout) = layout();
        let path = layout.staging_dir();
        let created = layout.ensure(path.clone()).unwrap();
        assert_eq!(created, path);
        assert!(path.is_dir());
    }
}
