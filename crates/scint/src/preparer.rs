// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preparer (§4.8, component C8): for one plan entry whose cached
//! artifact is not (yet) reusable, drives fetch → assemble → promote.
//! Failures at any stage leave `inbound/` intact for retries and remove any
//! partial `assembling/` tree.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use thiserror::Error;

use scint_ext::archive::{self, ArchiveKind};
use scint_ext::extbuild::{BuildError, ExtensionBuilder, OutputTail};
use scint_ext::git::GitCollaborator;
use scint_ext::{DownloadError, DownloadRequest, HttpPool};

use crate::cache::layout::CacheLayout;
use crate::cache::manifest::{self, BuildParams};
use crate::cache::promote;
use crate::fs as scint_fs;
use crate::types::{AbiKey, ResolvedSpec, SourceDescriptor};

#[derive(Debug, Error)]
pub enum Error {
    #[error("network: {0}")]
    Network(#[from] DownloadError),
    #[error("git: {0}")]
    Git(#[from] scint_ext::GitError),
    #[error("archive: {0}")]
    Archive(#[from] archive::ArchiveError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("fs: {0}")]
    Fs(#[from] scint_fs::Error),
    #[error("layout: {0}")]
    Layout(#[from] crate::cache::layout::Error),
    #[error("promote: {0}")]
    Promote(#[from] promote::Error),
    #[error("manifest: {0}")]
    Manifest(#[from] manifest::Error),
    #[error("compile: {0}")]
    Compile(#[from] BuildError),
    #[error("unresolvable source: builtin specs have nothing to prepare")]
    NothingToPrepare,
}

/// Drives fetch → assemble → compile → promote for resolved specs that need
/// it. Holds the download pool, the native-extension builder collaborator
/// (§6.5), and a per-repo clone/fetch mutex map (§4.8: "all clone/fetch
/// calls to the same repo are serialized by a per-repo in-memory mutex").
pub struct Preparer {
    downloader: Arc<HttpPool>,
    extension_builder: Arc<dyn ExtensionBuilder>,
    repo_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Preparer {
    pub fn new(downloader: Arc<HttpPool>, extension_builder: Arc<dyn ExtensionBuilder>) -> Self {
        Self {
            downloader,
            extension_builder,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    fn repo_lock(&self, uri: &str) -> Arc<Mutex<()>> {
        self.repo_locks.lock().expect("repo lock map lock").entry(uri.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run the full pipeline for `spec`, returning the path it was promoted
    /// to in the cache.
    pub fn prepare(&self, spec: &ResolvedSpec, layout: &CacheLayout, abi: &AbiKey) -> Result<PathBuf, Error> {
        let full_name = spec.full_name();

        let assembled = match &spec.source {
            SourceDescriptor::Builtin => return Err(Error::NothingToPrepare),
            SourceDescriptor::Path { absolute_path } => absolute_path.clone(),
            SourceDescriptor::Registry { uri } => self.prepare_registry(spec, layout, abi, uri.as_str())?,
            SourceDescriptor::Git {
                uri,
                revision,
                branch,
                tag,
                submodules,
                ..
            } => self.prepare_git(spec, layout, abi, uri.as_str(), revision.as_deref(), branch.as_deref(), tag.as_deref(), *submodules)?,
        };

        let cached_dir = self.promote(spec, layout, abi, &assembled)?;

        if !spec.source.is_path() {
            let assembling_dir = layout.assembling_dir(abi, &full_name);
            let _ = std::fs::remove_dir_all(&assembling_dir);
        }

        Ok(cached_dir)
    }

    fn prepare_registry(&self, spec: &ResolvedSpec, layout: &CacheLayout, abi: &AbiKey, uri: &str) -> Result<PathBuf, Error> {
        let full_name = spec.full_name();
        let gem_path = layout.inbound_gem_path(&full_name);

        if !gem_path.is_file() {
            layout.ensure(layout.inbound_gems_dir())?;
            let outcomes = self.downloader.download_batch(vec![DownloadRequest {
                uri: url::Url::parse(uri).map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?,
                dest: gem_path.clone(),
                checksum: spec.checksum.clone(),
            }]);
            if let Some(error) = outcomes.into_iter().next().and_then(|o| o.error) {
                return Err(error.into());
            }
        }

        let scratch = layout.assembling_scratch_path(abi, &full_name);
        layout.ensure(scratch.parent().expect("scratch path has a parent").to_path_buf())?;
        archive::extract_archive(&gem_path, &scratch, Some(ArchiveKind::TarGz))?;

        let assembling_dir = layout.assembling_dir(abi, &full_name);
        scint_fs::atomic_move(&scratch, &assembling_dir)?;
        Ok(assembling_dir)
    }

    #[allow(clippy::too_many_arguments)]
    fn prepare_git(
        &self,
        spec: &ResolvedSpec,
        layout: &CacheLayout,
        abi: &AbiKey,
        uri: &str,
        revision: Option<&str>,
        branch: Option<&str>,
        tag: Option<&str>,
        submodules: bool,
    ) -> Result<PathBuf, Error> {
        let full_name = spec.full_name();
        let slug = crate::cache::layout::slug_for_uri(uri);
        let bare_path = layout.inbound_git_path(&slug);

        let lock = self.repo_lock(uri);
        let _guard = lock.lock().expect("per-repo git lock");
        layout.ensure(layout.inbound_gits_dir())?;
        GitCollaborator::clone_or_fetch(uri, &bare_path)?;
        drop(_guard);

        let revspec = revision.or(tag).or(branch).unwrap_or("HEAD");
        let commit_id = GitCollaborator::resolve_commit(&bare_path, revspec)?;

        let scratch = layout.assembling_scratch_path(abi, &full_name);
        layout.ensure(scratch.parent().expect("scratch path has a parent").to_path_buf())?;
        GitCollaborator::checkout(&bare_path, &commit_id, &scratch, submodules)?;

        let assembling_dir = layout.assembling_dir(abi, &full_name);
        scint_fs::atomic_move(&scratch, &assembling_dir)?;
        Ok(assembling_dir)
    }

    /// Compile phase (§1's five-phase pipeline: "fetch → assemble → extract
    /// → compile → materialize") plus promotion. Compiling happens on the
    /// staging copy, before `promote_tree` — never on an already-promoted
    /// directory, which §3.3 forbids mutating in place.
    fn promote(&self, spec: &ResolvedSpec, layout: &CacheLayout, abi: &AbiKey, assembled_dir: &std::path::Path) -> Result<PathBuf, Error> {
        let full_name = spec.full_name();

        let cached_dir = promote::with_staging_dir(layout, "cached", |staging_dir| {
            scint_fs::clone_tree(assembled_dir, staging_dir).map_err(promote::Error::Fs)?;

            let built_extensions = self
                .compile(spec, staging_dir)
                .map_err(|e| promote::Error::Fs(scint_fs::Error::Io(io::Error::other(e.to_string()))))?;

            let built_manifest = manifest::build(&BuildParams {
                full_name: &full_name,
                gem_dir: staging_dir,
                abi_key: abi.as_str(),
                source: &spec.source,
                extensions: built_extensions,
            })
            .map_err(|e| promote::Error::Fs(scint_fs::Error::Io(io::Error::other(e.to_string()))))?;

            let outcome = promote::promote_tree(layout, abi, &full_name, staging_dir)?;

            // Sibling metadata is only ours to write once we actually moved
            // the tree in (§4.5): an `AlreadyExists` means a peer already
            // promoted and wrote its own manifest/spec for this key, which
            // must not be clobbered by a redundant write here.
            if outcome.was_promoted() {
                manifest::write(&layout.cached_manifest_path(abi, &full_name), &built_manifest)
                    .map_err(|e| promote::Error::Fs(scint_fs::Error::Io(io::Error::other(e.to_string()))))?;
                scint_fs::atomic_write(&layout.cached_spec_path(abi, &full_name), spec_blob(spec).as_bytes()).map_err(promote::Error::Fs)?;
            }

            Ok(outcome.into_path())
        })?;

        info!("promoted {full_name}");
        debug!("manifest + spec written alongside {}", cached_dir.display());
        Ok(cached_dir)
    }

    /// Runs the native-extension builder against the staging directory when
    /// the spec declares it needs one. Returns whether a build actually
    /// happened, which becomes the manifest's `build.extensions` field —
    /// the input the planner's "prior cached extension build exists" check
    /// (§4.9) reads back later.
    fn compile(&self, spec: &ResolvedSpec, staging_dir: &std::path::Path) -> Result<bool, BuildError> {
        if !spec.needs_extensions || !self.extension_builder.needs_build(staging_dir) {
            return Ok(false);
        }
        let tail = OutputTail::default();
        let outcome = self.extension_builder.build(staging_dir, staging_dir, 1, &tail)?;
        Ok(outcome.built)
    }
}

/// Minimal `.spec` blob: the resolver's own spec format is out of scope
/// (§1), so this records just enough JSON for the validity predicate's
/// presence check and for `scint list`/`scint info` to render something.
fn spec_blob(spec: &ResolvedSpec) -> String {
    serde_json::json!({
        "name": spec.id.name,
        "version": spec.id.version,
        "platform": spec.id.platform.to_string(),
        "source": spec.source.kind(),
    })
    .to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{Platform, PackageId};
    use scint_ext::NoopExtensionBuilder;

    fn path_spec(dir: &std::path::Path) -> ResolvedSpec {
        ResolvedSpec {
            id: PackageId::new("local-gem", "0.1.0", Platform::Portable),
            source: SourceDescriptor::Path { absolute_path: dir.to_path_buf() },
            dependencies: vec![],
            size: None,
            checksum: None,
            needs_extensions: false,
        }
    }

    #[test]
    fn prepare_promotes_a_path_source_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let source_dir = tmp.path().join("local-gem");
        std::fs::create_dir_all(source_dir.join("lib")).unwrap();
        std::fs::write(source_dir.join("lib/local_gem.rb"), b"puts 1").unwrap();

        let layout = CacheLayout::new(tmp.path().join("cache"));
        let abi = AbiKey::new("rt-3.3.0");
        let preparer = Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder));

        let spec = path_spec(&source_dir);
        let cached = preparer.prepare(&spec, &layout, &abi).unwrap();

        assert!(cached.join("lib/local_gem.rb").is_file());
        assert!(layout.cached_spec_path(&abi, &spec.full_name()).is_file());
        assert!(layout.cached_manifest_path(&abi, &spec.full_name()).is_file());
    }

    #[test]
    fn builtin_specs_refuse_preparation() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path());
        let abi = AbiKey::new("rt-3.3.0");
        let preparer = Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder));

        let spec = ResolvedSpec {
            id: PackageId::new("scint-bundled", "1.0", Platform::Portable),
            source: SourceDescriptor::Builtin,
            dependencies: vec![],
            size: None,
            checksum: None,
            needs_extensions: false,
        };

        assert!(matches!(preparer.prepare(&spec, &layout, &abi), Err(Error::NothingToPrepare)));
    }
}
