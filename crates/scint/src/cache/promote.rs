// SPDX-License-Identifier: MIT OR Apache-2.0

//! Promoter (§4.5, component C5): atomic staging-directory-to-cache
//! publication under an exclusive file lock, modelled on
//! `moss::installation::lockfile` acquire/flock pattern.

use std::fmt;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fs_err::{self as fs, File};
use log::{debug, info, warn};
use nix::fcntl::{flock, FlockArg};
use thiserror::Error;

use crate::cache::layout::CacheLayout;
use crate::fs as scint_fs;
use crate::types::AbiKey;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("obtaining exclusive promotion lock: {0}")]
    Flock(#[from] nix::Error),
    #[error("layout: {0}")]
    Layout(#[from] crate::cache::layout::Error),
    #[error("fs: {0}")]
    Fs(#[from] scint_fs::Error),
}

/// An acquired, ref-counted exclusive lock. Released when the last clone is
/// dropped.
#[derive(Debug, Clone)]
#[allow(unused)]
pub struct Lock(Arc<File>);

/// Acquire the promotion lock for `lock_key`, blocking (and logging) if
/// another writer already holds it (§4.5 step 3).
pub fn acquire(layout: &CacheLayout, lock_key: &str) -> Result<Lock, Error> {
    let path = layout.ensure(layout.promotion_lock_path(lock_key).parent().expect("lock path has a parent").to_path_buf())?;
    let lock_path = layout.promotion_lock_path(lock_key);
    let _ = path;

    let file = fs::OpenOptions::new().create(true).write(true).truncate(false).open(&lock_path)?;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => {}
        Err(nix::errno::Errno::EWOULDBLOCK) => {
            info!("waiting for promotion lock on {lock_key}");
            flock(file.as_raw_fd(), FlockArg::LockExclusive)?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Lock(Arc::new(file)))
}

/// Outcome of [`promote_tree`] (§4.5's `Promoted | AlreadyExists`, §8
/// property 4). Both variants carry the final cached directory path;
/// callers that only care about the path can call
/// [`PromoteOutcome::into_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoteOutcome {
    Promoted(PathBuf),
    AlreadyExists(PathBuf),
}

impl PromoteOutcome {
    pub fn into_path(self) -> PathBuf {
        match self {
            PromoteOutcome::Promoted(p) | PromoteOutcome::AlreadyExists(p) => p,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            PromoteOutcome::Promoted(p) | PromoteOutcome::AlreadyExists(p) => p,
        }
    }

    pub fn was_promoted(&self) -> bool {
        matches!(self, PromoteOutcome::Promoted(_))
    }
}

/// Promote a fully-assembled staging directory into the cache under
/// `(abi, full_name)`. Idempotent: if a peer has already promoted the same
/// key while we waited for the lock, the staging directory is discarded and
/// `AlreadyExists` is returned with the existing cached directory (§4.5
/// steps 4-6, §8 property 4).
///
/// Both `staging_dir` and the computed cached directory are checked against
/// the cache root before anything is touched (§3.3, §4.5 step 1): a caller
/// that hands in a path outside `layout.root()` gets a structured `Error`
/// instead of a move landing somewhere unexpected.
pub fn promote_tree(layout: &CacheLayout, abi: &AbiKey, full_name: &str, staging_dir: &Path) -> Result<PromoteOutcome, Error> {
    layout.guard_within_root(staging_dir)?;
    let cached_dir = layout.cached_dir(abi, full_name);
    layout.guard_within_root(&cached_dir)?;

    let lock_key = format!("{}:{full_name}", abi.as_str());
    let _lock = acquire(layout, &lock_key)?;

    if cached_dir.is_dir() {
        warn!("{full_name} already promoted under {abi}, discarding redundant staging directory");
        std::fs::remove_dir_all(staging_dir).map_err(scint_fs::Error::from)?;
        return Ok(PromoteOutcome::AlreadyExists(cached_dir));
    }

    layout.ensure(layout.cached_abi_dir(abi))?;
    scint_fs::atomic_move(staging_dir, &cached_dir)?;
    debug!("promoted {full_name} into {}", cached_dir.display());

    Ok(PromoteOutcome::Promoted(cached_dir))
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

struct StagingGuard(PathBuf);

impl Drop for StagingGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Scoped staging directory under `<root>/staging/` (§4.5's
/// `with_staging_dir(prefix)`), removed on every exit path — success, error,
/// or the promote having already moved it away. Unlike
/// `scint_fs::with_tempdir`, the directory handed to `f` lives inside the
/// cache root, so `atomic_move` into the cached directory is a same-filesystem
/// rename rather than the cross-device copy fallback.
pub fn with_staging_dir<T>(layout: &CacheLayout, prefix: &str, f: impl FnOnce(&Path) -> Result<T, Error>) -> Result<T, Error> {
    let staging_root = layout.ensure(layout.staging_dir())?;
    let pid = std::process::id();
    let tid = scint_fs::thread_id();
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = staging_root.join(format!("{prefix}.{pid}.{tid}.{seq}"));

    std::fs::create_dir_all(&dir).map_err(scint_fs::Error::from)?;
    let _guard = StagingGuard(dir.clone());

    f(&dir)
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<promotion lock>")
    }
}
