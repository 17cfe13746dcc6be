// SPDX-License-Identifier: MIT OR Apache-2.0

//! FS primitives (§4.1, component C1).
//!
//! Every operation here must be safe under concurrent callers operating on
//! overlapping destinations: a lost creation race leaves the destination
//! present and correct, so `EEXIST` (or an `Ok` after a post-hoc existence
//! check) is treated as success rather than propagated.

use std::collections::HashSet;
use std::fs as std_fs;
use std::io;
use std::os::unix::fs::symlink as unix_symlink;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs_err as fs;
use thiserror::Error;
use walkdir::WalkDir;

use crate::cache::manifest::{Entry as ManifestEntry, EntryKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("manifest entry has an unsafe path: {0}")]
    UnsafePath(String),
}

/// Process-wide memoization of directories known to already exist, mirroring
/// `moss`'s `ensure_dirs_exist`/mkdir-memo pattern: entries are
/// write-once and the set never shrinks, so a stale hit is never wrong, only
/// (rarely) redundant.
#[derive(Debug, Default)]
pub struct DirCache(Mutex<HashSet<PathBuf>>);

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent `mkdir -p`. The cache update does not hold the lock across
    /// the syscall: two threads racing to create the same directory both
    /// call `create_dir_all`, and the loser observes `AlreadyExists`, which
    /// is not an error here.
    pub fn mkdir_p(&self, path: &Path) -> Result<(), Error> {
        if self.0.lock().expect("dir cache lock").contains(path) {
            return Ok(());
        }

        match fs::create_dir_all(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        self.0.lock().expect("dir cache lock").insert(path.to_path_buf());
        Ok(())
    }
}

/// Materialize one file from `src` to `dst` using the fastest available
/// mechanism: copy-on-write clone, then hardlink, then byte copy. A
/// concurrent peer having already materialized `dst` is treated as success.
pub fn clonefile(src: &Path, dst: &Path) -> Result<(), Error> {
    if dst.exists() {
        return Ok(());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match reflink_copy::reflink(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
        Err(_) => {}
    }

    match std_fs::hard_link(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
        Err(_) => {}
    }

    match fs::copy(src, dst) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Recursive tree clone. Falls back strategy-by-strategy per file; tolerant
/// of a concurrent peer already having materialized a child.
pub fn clone_tree(src_dir: &Path, dst_dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dst_dir)?;

    for entry in WalkDir::new(src_dir).into_iter().filter_map(Result::ok) {
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .expect("walkdir entries are under src_dir");
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst_dir.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            match fs::create_dir(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        } else if file_type.is_symlink() {
            clone_symlink(entry.path(), &target)?;
        } else {
            clonefile(entry.path(), &target)?;
        }
    }

    Ok(())
}

fn clone_symlink(src: &Path, dst: &Path) -> Result<(), Error> {
    if dst.symlink_metadata().is_ok() {
        return Ok(());
    }
    let target = std_fs::read_link(src)?;
    match unix_symlink(&target, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Materialize a cached tree into `dst_dir` by iterating a manifest's file
/// list instead of scanning `src_dir`. Rejects entries whose relative path
/// is empty, absolute, or contains `..` (§4.1).
pub fn materialize_from_manifest(src_dir: &Path, dst_dir: &Path, entries: &[ManifestEntry]) -> Result<(), Error> {
    for entry in entries {
        validate_relative_path(&entry.path)?;

        let src = src_dir.join(&entry.path);
        let dst = dst_dir.join(&entry.path);

        match entry.kind {
            EntryKind::Dir => match fs::create_dir_all(&dst) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            },
            EntryKind::Symlink => clone_symlink(&src, &dst)?,
            EntryKind::File => clonefile(&src, &dst)?,
        }
    }

    Ok(())
}

fn validate_relative_path(path: &Path) -> Result<(), Error> {
    if path.as_os_str().is_empty() {
        return Err(Error::UnsafePath("empty path".into()));
    }
    if path.is_absolute() {
        return Err(Error::UnsafePath(format!("absolute path: {}", path.display())));
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(Error::UnsafePath(format!("path escapes root: {}", path.display())));
    }
    Ok(())
}

/// Batch-materialize many source trees under one destination parent.
/// Processes in chunks of `chunk_size` (default 64, §4.1/§5 ARG_MAX
/// note); within a chunk, sources are cloned in parallel. Skips sources
/// whose target already exists.
pub fn clone_many_trees(src_dirs: &[(PathBuf, String)], dst_parent: &Path, chunk_size: usize) -> Result<(), Error> {
    let chunk_size = if chunk_size == 0 { 64 } else { chunk_size };
    fs::create_dir_all(dst_parent)?;

    for chunk in src_dirs.chunks(chunk_size) {
        let results: Vec<Result<(), Error>> = chunk
            .iter()
            .map(|(src, name)| {
                let dst = dst_parent.join(name);
                if dst.exists() {
                    return Ok(());
                }
                clone_tree(src, &dst)
            })
            .collect();

        for result in results {
            result?;
        }
    }

    Ok(())
}

/// Rename with cross-device fallback: copy to a sibling temp file, rename,
/// then remove the source.
pub fn atomic_move(src: &Path, dst: &Path) -> Result<(), Error> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            let tmp = sibling_temp_path(dst, "move");
            copy_any(src, &tmp)?;
            fs::rename(&tmp, dst)?;
            remove_any(src)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc_exdev())
}

#[cfg(target_os = "linux")]
fn libc_exdev() -> i32 {
    18 // EXDEV
}

#[cfg(not(target_os = "linux"))]
fn libc_exdev() -> i32 {
    18
}

fn copy_any(src: &Path, dst: &Path) -> Result<(), Error> {
    let meta = std_fs::symlink_metadata(src)?;
    if meta.is_dir() {
        clone_tree(src, dst)
    } else if meta.file_type().is_symlink() {
        clone_symlink(src, dst)
    } else {
        fs::copy(src, dst)?;
        Ok(())
    }
}

fn remove_any(path: &Path) -> Result<(), Error> {
    let meta = std_fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Atomically write `bytes` to `path`: write to a sibling temp file (name
/// includes pid and thread id to avoid collisions between concurrent
/// writers), then rename over the destination.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = sibling_temp_path(path, "write");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn sibling_temp_path(path: &Path, tag: &str) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let pid = std::process::id();
    let tid = thread_id();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!(".{file_name}.{tag}.{pid}.{tid}.tmp"))
}

pub(crate) fn thread_id() -> String {
    format!("{:?}", std::thread::current().id())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Scoped acquisition of a temporary directory with guaranteed removal on
/// all exit paths (success, error, or panic unwinding through `f`).
pub fn with_tempdir<T>(prefix: &str, f: impl FnOnce(&Path) -> Result<T, Error>) -> Result<T, Error> {
    let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
    f(dir.path())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mkdir_p_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DirCache::new();
        let target = tmp.path().join("a/b/c");
        cache.mkdir_p(&target).unwrap();
        cache.mkdir_p(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn clonefile_is_idempotent_on_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dst = tmp.path().join("dst.txt");
        std_fs::write(&src, b"hello").unwrap();

        clonefile(&src, &dst).unwrap();
        clonefile(&src, &dst).unwrap();

        assert_eq!(std_fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn materialize_from_manifest_rejects_escaping_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = vec![ManifestEntry {
            kind: EntryKind::File,
            path: PathBuf::from("../escape.txt"),
            size: 0,
            mode: 0o644,
            sha256: String::new(),
        }];

        let result = materialize_from_manifest(tmp.path(), tmp.path(), &entries);
        assert!(matches!(result, Err(Error::UnsafePath(_))));
    }

    #[test]
    fn atomic_write_is_visible_all_at_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");
        atomic_write(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std_fs::read(&path).unwrap(), b"{\"a\":1}");

        atomic_write(&path, b"{\"a\":2}").unwrap();
        assert_eq!(std_fs::read(&path).unwrap(), b"{\"a\":2}");
    }

    #[test]
    fn clone_tree_tolerates_pre_existing_children() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std_fs::create_dir_all(src.join("nested")).unwrap();
        std_fs::write(src.join("nested/file.txt"), b"data").unwrap();

        // Simulate a peer having already materialized part of the tree.
        std_fs::create_dir_all(dst.join("nested")).unwrap();

        clone_tree(&src, &dst).unwrap();
        assert_eq!(std_fs::read(dst.join("nested/file.txt")).unwrap(), b"data");
    }
}
