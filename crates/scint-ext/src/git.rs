// SPDX-License-Identifier: MIT OR Apache-2.0

//! Git source collaborator (§4.8's git fetch stage): clone-or-fetch a
//! bare mirror, then check out a resolved revision into a worktree with
//! optional submodule update.

use std::path::{Path, PathBuf};

use git2::{FetchOptions, Repository};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git2: {0}")]
    Git2(#[from] git2::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("revision {0} not found")]
    RevisionNotFound(String),
}

pub struct GitCollaborator;

impl GitCollaborator {
    /// Clone into `bare_path` if it doesn't exist yet, otherwise fetch all
    /// refs. Both cases are serialized per-repo by the caller (§4.8:
    /// "all clone/fetch calls to the same repo are serialized by a per-repo
    /// in-memory mutex").
    pub fn clone_or_fetch(uri: &str, bare_path: &Path) -> Result<Repository, GitError> {
        if bare_path.join("HEAD").is_file() {
            let repo = Repository::open_bare(bare_path)?;
            Self::fetch_all(&repo)?;
            Ok(repo)
        } else {
            if let Some(parent) = bare_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let repo = Repository::init_bare(bare_path)?;
            {
                let mut remote = repo.remote_anonymous(uri)?;
                remote.fetch(&["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"], Some(&mut FetchOptions::new()), None)?;
            }
            Ok(repo)
        }
    }

    fn fetch_all(repo: &Repository) -> Result<(), GitError> {
        let remotes = repo.remotes()?;
        for name in remotes.iter().flatten() {
            let mut remote = repo.find_remote(name)?;
            remote.fetch(&["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"], Some(&mut FetchOptions::new()), None)?;
        }
        Ok(())
    }

    /// Resolve `revision` (a full SHA, short SHA, branch, or tag) to a
    /// commit id within `bare_path`.
    pub fn resolve_commit(bare_path: &Path, revision: &str) -> Result<String, GitError> {
        let repo = Repository::open_bare(bare_path)?;
        let object = repo
            .revparse_single(revision)
            .map_err(|_| GitError::RevisionNotFound(revision.to_string()))?;
        let commit = object.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Check out `commit_id` from the bare mirror at `bare_path` into
    /// `worktree_dir`, stripping `.git/` for determinism (§4.8), and
    /// recursively initializing submodules when requested.
    pub fn checkout(bare_path: &Path, commit_id: &str, worktree_dir: &Path, submodules: bool) -> Result<(), GitError> {
        let repo = Repository::open_bare(bare_path)?;
        let oid = git2::Oid::from_str(commit_id)?;
        let commit = repo.find_commit(oid)?;
        let tree = commit.tree()?;

        std::fs::create_dir_all(worktree_dir)?;

        let mut checkout_builder = git2::build::CheckoutBuilder::new();
        checkout_builder.target_dir(worktree_dir).force();
        repo.checkout_tree(tree.as_object(), Some(&mut checkout_builder))?;
        write_tree_to_dir(&repo, &tree, worktree_dir)?;

        if submodules {
            Self::update_submodules(worktree_dir)?;
        }

        strip_git_dir(worktree_dir)?;
        Ok(())
    }

    fn update_submodules(worktree_dir: &Path) -> Result<(), GitError> {
        if let Ok(repo) = Repository::open(worktree_dir) {
            for mut submodule in repo.submodules()? {
                submodule.update(true, None)?;
            }
        }
        Ok(())
    }
}

/// `checkout_tree` alone only populates files relative to the repository's
/// own workdir concept, which a bare repo lacks; walk the tree explicitly so
/// every blob lands under `worktree_dir` regardless of checkout-builder
/// target semantics on bare repositories.
fn write_tree_to_dir(repo: &Repository, tree: &git2::Tree<'_>, dest: &Path) -> Result<(), GitError> {
    for entry in tree.iter() {
        let name = entry.name().unwrap_or_default();
        let path = dest.join(name);
        match entry.kind() {
            Some(git2::ObjectType::Tree) => {
                let subtree = entry.to_object(repo)?.peel_to_tree()?;
                std::fs::create_dir_all(&path)?;
                write_tree_to_dir(repo, &subtree, &path)?;
            }
            Some(git2::ObjectType::Blob) => {
                let blob = entry.to_object(repo)?.peel_to_blob()?;
                std::fs::write(&path, blob.content())?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn strip_git_dir(worktree_dir: &Path) -> Result<(), GitError> {
    let git_dir = worktree_dir.join(".git");
    if git_dir.is_dir() {
        std::fs::remove_dir_all(&git_dir)?;
    } else if git_dir.is_file() {
        std::fs::remove_file(&git_dir)?;
    }
    Ok(())
}

/// Slug a remote git URI into a `locks`/`inbound` directory name segment.
/// Delegates to nothing crate-specific: callers combine this with the cache
/// layout's own `slug_for_uri`.
pub fn repo_slug_hint(uri: &str) -> PathBuf {
    PathBuf::from(uri.trim_end_matches('/').trim_end_matches(".git").replace(['/', ':'], "_"))
}
