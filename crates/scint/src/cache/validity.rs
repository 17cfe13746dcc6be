// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validity predicate (§4.4, component C4): decides whether a cached
//! artifact may be linked into an install target without re-fetching or
//! rebuilding it.

use std::path::Path;

use crate::cache::layout::CacheLayout;
use crate::cache::manifest::{self, Manifest};
use crate::types::{AbiKey, ResolvedSpec};

/// Why a cached artifact was (or was not) accepted, surfaced for `--verbose`
/// diagnostics (§6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Missing,
    ManifestUnreadable,
    ChecksumMismatch { expected: String, found: Option<String> },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Cached validity: the directory exists, its sibling manifest parses and
/// names the expected ABI and full name, and (when the resolved spec carries
/// a checksum) the manifest's top-level files hash to it (§4.4).
///
/// A cache with no recorded checksum is trusted on manifest presence alone —
/// `checksum` is an upstream-registry guarantee the resolver may not always
/// have, not a cache-layer requirement.
pub fn check(layout: &CacheLayout, abi: &AbiKey, spec: &ResolvedSpec) -> Verdict {
    let full_name = spec.full_name();
    let dir = layout.cached_dir(abi, &full_name);
    if !dir.is_dir() {
        return Verdict::Missing;
    }

    // §4.4 step 2: a `.spec` blob must exist alongside the cached
    // directory. Its contents are opaque to the cache layer (the resolver
    // collaborator owns that format); only presence is load-bearing here.
    if !layout.cached_spec_path(abi, &full_name).is_file() {
        return Verdict::Missing;
    }

    let manifest_path = layout.cached_manifest_path(abi, &full_name);
    let Some(manifest) = manifest::read(&manifest_path) else {
        return Verdict::ManifestUnreadable;
    };

    if manifest.abi != abi.as_str() || manifest.full_name != full_name {
        return Verdict::ManifestUnreadable;
    }

    if let Some(expected) = &spec.checksum {
        let found = manifest_checksum(&manifest);
        if found.as_deref() != Some(expected.as_str()) {
            return Verdict::ChecksumMismatch { expected: expected.clone(), found };
        }
    }

    Verdict::Valid
}

/// Aggregate checksum for a manifest: the sha256 of the sorted per-file
/// sha256 list, joined by newline. Deterministic because `Manifest::files`
/// is always written path-sorted.
fn manifest_checksum(manifest: &Manifest) -> Option<String> {
    if manifest.files.is_empty() {
        return None;
    }
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for entry in &manifest.files {
        hasher.update(entry.sha256.as_bytes());
        hasher.update(b"\n");
    }
    Some(hex::encode(hasher.finalize()))
}

/// Convenience: does a cached directory exist at all, independent of
/// manifest validity. Used by the planner's cheap first pass before it
/// invokes the full [`check`].
pub fn cached_dir_exists(layout: &CacheLayout, abi: &AbiKey, full_name: &str) -> bool {
    let dir = layout.cached_dir(abi, full_name);
    dir.is_dir()
}

pub fn manifest_path_for(layout: &CacheLayout, abi: &AbiKey, full_name: &str) -> std::path::PathBuf {
    layout.cached_manifest_path(abi, full_name)
}

#[allow(dead_code)]
fn _assert_path_is_path(_: &Path) {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::manifest::{BuildInfo, Entry, EntryKind, SourceInfo};
    use crate::types::{Platform, PackageId, SourceDescriptor};
    use url::Url;

    fn spec(full_name_version: &str, checksum: Option<&str>) -> ResolvedSpec {
        ResolvedSpec {
            id: PackageId::new("rack", full_name_version, Platform::Portable),
            source: SourceDescriptor::Registry { uri: Url::parse("https://rubygems.org/gems/rack").unwrap() },
            dependencies: vec![],
            size: None,
            checksum: checksum.map(str::to_string),
            needs_extensions: false,
        }
    }

    #[test]
    fn missing_directory_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        let abi = AbiKey::new("rt-3.3.0");
        assert_eq!(check(&layout, &abi, &spec("2.2.8", None)), Verdict::Missing);
    }

    #[test]
    fn directory_without_spec_blob_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        let abi = AbiKey::new("rt-3.3.0");
        std::fs::create_dir_all(layout.cached_dir(&abi, "rack-2.2.8")).unwrap();

        assert_eq!(check(&layout, &abi, &spec("2.2.8", None)), Verdict::Missing);
    }

    #[test]
    fn directory_without_manifest_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        let abi = AbiKey::new("rt-3.3.0");
        std::fs::create_dir_all(layout.cached_dir(&abi, "rack-2.2.8")).unwrap();
        std::fs::write(layout.cached_spec_path(&abi, "rack-2.2.8"), b"{}").unwrap();

        assert_eq!(check(&layout, &abi, &spec("2.2.8", None)), Verdict::ManifestUnreadable);
    }

    #[test]
    fn manifest_present_with_no_checksum_requirement_is_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        let abi = AbiKey::new("rt-3.3.0");
        std::fs::create_dir_all(layout.cached_dir(&abi, "rack-2.2.8")).unwrap();
        std::fs::write(layout.cached_spec_path(&abi, "rack-2.2.8"), b"{}").unwrap();

        let manifest = Manifest {
            version: 1,
            abi: abi.as_str().to_string(),
            full_name: "rack-2.2.8".to_string(),
            source: SourceInfo::Registry { uri: "https://rubygems.org/gems/rack".into() },
            build: BuildInfo { extensions: false },
            files: vec![Entry {
                kind: EntryKind::File,
                path: "lib/rack.rb".into(),
                size: 4,
                mode: 0o644,
                sha256: "abc123".into(),
            }],
        };
        manifest::write(&layout.cached_manifest_path(&abi, "rack-2.2.8"), &manifest).unwrap();

        assert_eq!(check(&layout, &abi, &spec("2.2.8", None)), Verdict::Valid);
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        let abi = AbiKey::new("rt-3.3.0");
        std::fs::create_dir_all(layout.cached_dir(&abi, "rack-2.2.8")).unwrap();
        std::fs::write(layout.cached_spec_path(&abi, "rack-2.2.8"), b"{}").unwrap();

        let manifest = Manifest {
            version: 1,
            abi: abi.as_str().to_string(),
            full_name: "rack-2.2.8".to_string(),
            source: SourceInfo::Registry { uri: "https://rubygems.org/gems/rack".into() },
            build: BuildInfo { extensions: false },
            files: vec![Entry {
                kind: EntryKind::File,
                path: "lib/rack.rb".into(),
                size: 4,
                mode: 0o644,
                sha256: "abc123".into(),
            }],
        };
        manifest::write(&layout.cached_manifest_path(&abi, "rack-2.2.8"), &manifest).unwrap();

        let verdict = check(&layout, &abi, &spec("2.2.8", Some("not-the-real-checksum")));
        assert!(matches!(verdict, Verdict::ChecksumMismatch { .. }));
    }
}
