// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration glue: turns a resolved set into a classified plan (§4.9),
//! dispatches it through the scheduler (§4.7) onto preparer/materializer
//! work, and records the resulting load paths for `exec` (§6.5).
//!
//! Group filtering (`--without`/`--with`, §6.1) is accepted here as CLI
//! input but is not applied to the resolved set itself: §3.6's minimum
//! `ResolvedSpec` fields carry no group tag, so filtering by group is a
//! resolver-side concern (out of scope per §1) upstream of this pipeline.
//! The flags are still threaded through so a future resolver integration has
//! somewhere to plug in (see `DESIGN.md`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use scint_ext::runtime::{write_runtime_lock, LoadPathEntry, RuntimeLock};

use crate::cache::layout::CacheLayout;
use crate::config;
use crate::destination::Destination;
use crate::error::ScintError;
use crate::materializer::BulkMaterializer;
use crate::planner::{self};
use crate::pool::Pool;
use crate::preparer::Preparer;
use crate::scheduler::{JobId, NewJob, RunSummary, Scheduler};
use crate::types::{AbiKey, Action, JobType, PlanEntry, ResolvedSpec};

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub jobs: usize,
    pub force: bool,
    pub without: Vec<String>,
    pub with: Vec<String>,
    /// §4.7.2/§7: abort the run on the first job failure rather than
    /// letting independent branches of the plan keep running to completion.
    pub fail_fast: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            jobs: config::default_max_workers(),
            force: false,
            without: Vec::new(),
            with: Vec::new(),
            fail_fast: true,
        }
    }
}

pub struct InstallReport {
    pub plan: Vec<PlanEntry>,
    pub summary: RunSummary,
}

/// Run the classify → schedule → materialize pipeline to completion and
/// write the runtime lock used by the `exec` command.
#[allow(clippy::too_many_arguments)]
pub fn install(
    resolved: &[ResolvedSpec],
    dest: &Destination,
    layout: Arc<CacheLayout>,
    abi: Arc<AbiKey>,
    opts: &InstallOptions,
    preparer: Arc<Preparer>,
) -> Result<InstallReport, ScintError> {
    if !opts.without.is_empty() || !opts.with.is_empty() {
        info!("group filters {:?}/{:?} noted, resolver output already reflects group membership", opts.without, opts.with);
    }

    let plan = planner::plan(resolved, dest, &layout, &abi, opts.force);

    let pool = Arc::new(Pool::new(opts.jobs.max(1)));
    // §4.7.2's default: serialize native-extension compilation to protect
    // the host machine even while downloads and links stay parallel.
    let caps = std::collections::HashMap::from([(JobType::Build, 1)]);
    let scheduler = Scheduler::new(pool, caps, opts.fail_fast);

    let materializer = Arc::new(BulkMaterializer::probe(dest.root().join("pkgs"), None, 64));
    std::fs::create_dir_all(dest.root().join("pkgs"))?;
    std::fs::create_dir_all(dest.root().join("specs"))?;

    // Dependencies, not just plain indices, gate dispatch order (§3.7): an
    // entry's job carries `depends_on` for every other plan entry its own
    // `ResolvedSpec.dependencies` names resolve to, so the scheduler never
    // starts a dependent's work before its dependency has been prepared.
    let order = planner::dependency_order(&plan).unwrap_or_else(|cycle| {
        warn!("dependency graph has a cycle at plan index {cycle}, falling back to plan order");
        (0..plan.len()).collect()
    });
    let dependency_indices = direct_dependencies(&plan);
    let mut job_ids: HashMap<usize, JobId> = HashMap::new();

    // `materializer.request` blocks its caller until its own target is
    // flushed, but a flush only happens automatically once `chunk_size`
    // requests have piled up (§4.10) — for plans smaller than that, every
    // worker would block forever waiting on a flush nothing ever triggers.
    // A dedicated thread drains on a short interval for as long as the
    // scheduler still has work outstanding, then performs one last drain
    // after `run_to_completion` returns so nothing is left pending.
    let stop_flush = Arc::new(AtomicBool::new(false));
    let flush_handle = {
        let materializer = Arc::clone(&materializer);
        let stop_flush = Arc::clone(&stop_flush);
        std::thread::Builder::new()
            .name("scint-materializer-flush".into())
            .spawn(move || materializer.drain_until_stopped(&stop_flush))
            .expect("spawning materializer flush thread")
    };

    for &index in &order {
        let entry = &plan[index];
        let depends_on: Vec<JobId> = dependency_indices
            .get(&index)
            .into_iter()
            .flatten()
            .filter_map(|dep_index| job_ids.get(dep_index).copied())
            .collect();

        let job_id = match entry.action {
            Action::Skip | Action::Builtin => None,
            Action::Link => schedule_link(&scheduler, entry, depends_on, &materializer, dest),
            Action::Download | Action::Build => schedule_prepare(&scheduler, entry, depends_on, &preparer, &layout, &abi, &materializer, dest),
        };

        if let Some(job_id) = job_id {
            job_ids.insert(index, job_id);
        }
    }

    let summary = scheduler.run_to_completion();

    stop_flush.store(true, Ordering::Release);
    flush_handle.join().expect("materializer flush thread panicked")?;

    write_runtime_lock_for(&plan, dest)?;

    Ok(InstallReport { plan, summary })
}

/// For each plan index, the indices of the other plan entries it directly
/// depends on by name (§3.6: dependency names only, matched against the
/// same resolved set). A name with no match in `plan` is left out.
fn direct_dependencies(plan: &[PlanEntry]) -> HashMap<usize, Vec<usize>> {
    let index_by_name: HashMap<&str, usize> = plan.iter().enumerate().map(|(i, e)| (e.spec.id.name.as_str(), i)).collect();

    plan.iter()
        .enumerate()
        .map(|(i, entry)| {
            let deps = entry
                .spec
                .dependencies
                .iter()
                .filter_map(|name| index_by_name.get(name.as_str()).copied())
                .filter(|&dep_index| dep_index != i)
                .collect();
            (i, deps)
        })
        .collect()
}

fn schedule_link(scheduler: &Arc<Scheduler>, entry: &PlanEntry, depends_on: Vec<JobId>, materializer: &Arc<BulkMaterializer>, dest: &Destination) -> Option<JobId> {
    let full_name = entry.spec.full_name();
    let cached_path = entry.cached_path.clone().unwrap_or_else(|| entry.target_path.clone());
    let materializer = Arc::clone(materializer);
    let spec_blob_path = dest.spec_path(&full_name);

    scheduler.submit_job(NewJob::new(JobType::Link, depends_on, move || {
        materializer
            .request(cached_path, full_name.clone(), None)
            .map_err(|e| e.to_string())?;
        if let Some(parent) = spec_blob_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&spec_blob_path, b"{}").map_err(|e| e.to_string())?;
        Ok(Vec::new())
    }))
}

#[allow(clippy::too_many_arguments)]
fn schedule_prepare(
    scheduler: &Arc<Scheduler>,
    entry: &PlanEntry,
    depends_on: Vec<JobId>,
    preparer: &Arc<Preparer>,
    layout: &Arc<CacheLayout>,
    abi: &Arc<AbiKey>,
    materializer: &Arc<BulkMaterializer>,
    dest: &Destination,
) -> Option<JobId> {
    let spec = entry.spec.clone();
    let full_name = spec.full_name();
    let preparer = Arc::clone(preparer);
    let layout = Arc::clone(layout);
    let abi = Arc::clone(abi);
    let materializer = Arc::clone(materializer);
    let spec_blob_path = dest.spec_path(&full_name);
    let job_type = if entry.spec.needs_extensions { JobType::Build } else { JobType::Download };

    scheduler.submit_job(NewJob::new(job_type, depends_on, move || {
        let cached_dir = preparer.prepare(&spec, &layout, &abi).map_err(|e| e.to_string())?;

        materializer.request(cached_dir, full_name.clone(), None).map_err(|e| e.to_string())?;

        if let Some(parent) = spec_blob_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&spec_blob_path, b"{}").map_err(|e| e.to_string())?;
        Ok(Vec::new())
    }))
}

fn write_runtime_lock_for(plan: &[PlanEntry], dest: &Destination) -> Result<(), ScintError> {
    let entries = plan
        .iter()
        .filter(|e| e.action != Action::Builtin)
        .map(|e| {
            let full_name = e.spec.full_name();
            LoadPathEntry {
                full_name: full_name.clone(),
                load_path: dest.pkg_dir(&full_name).join("lib"),
            }
        })
        .collect();

    write_runtime_lock(&dest.root().join("scint.runtime.lock"), &RuntimeLock { entries })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{PackageId, Platform, SourceDescriptor};
    use scint_ext::{HttpPool, NoopExtensionBuilder};

    #[test]
    fn installs_a_path_source_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let source_dir = tmp.path().join("src").join("local-gem");
        std::fs::create_dir_all(source_dir.join("lib")).unwrap();
        std::fs::write(source_dir.join("lib/local_gem.rb"), b"puts 1").unwrap();

        let layout = Arc::new(CacheLayout::new(tmp.path().join("cache")));
        let abi = Arc::new(AbiKey::new("rt-3.3.0"));
        let dest = Destination::new(tmp.path().join("dest"));
        let preparer = Arc::new(Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder)));

        let resolved = vec![ResolvedSpec {
            id: PackageId::new("local-gem", "0.1.0", Platform::Portable),
            source: SourceDescriptor::Path { absolute_path: source_dir },
            dependencies: vec![],
            size: None,
            checksum: None,
            needs_extensions: false,
        }];

        let report = install(&resolved, &dest, layout, abi, &InstallOptions::default(), preparer).unwrap();

        assert_eq!(report.summary.failed, 0);
        assert!(dest.pkg_dir("local-gem-0.1.0").join("lib/local_gem.rb").is_file());
        assert!(dest.root().join("scint.runtime.lock").is_file());
    }

    /// Regression test for a deadlock: `materializer.request` blocks its
    /// caller until a flush covers it, and below `chunk_size` (64) nothing
    /// triggers one automatically. A plan with only a couple of entries used
    /// to hang forever inside `run_to_completion`; this must return promptly.
    #[test]
    fn installs_a_small_plan_without_deadlocking() {
        let tmp = tempfile::tempdir().unwrap();
        let mut resolved = Vec::new();
        for name in ["one", "two", "three"] {
            let source_dir = tmp.path().join("src").join(name);
            std::fs::create_dir_all(source_dir.join("lib")).unwrap();
            std::fs::write(source_dir.join("lib").join(format!("{name}.rb")), b"puts 1").unwrap();
            resolved.push(ResolvedSpec {
                id: PackageId::new(name, "1.0", Platform::Portable),
                source: SourceDescriptor::Path { absolute_path: source_dir },
                dependencies: vec![],
                size: None,
                checksum: None,
                needs_extensions: false,
            });
        }

        let layout = Arc::new(CacheLayout::new(tmp.path().join("cache")));
        let abi = Arc::new(AbiKey::new("rt-3.3.0"));
        let dest = Destination::new(tmp.path().join("dest"));
        let preparer = Arc::new(Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder)));

        let report = install(&resolved, &dest, layout, abi, &InstallOptions::default(), preparer).unwrap();

        assert_eq!(report.summary.failed, 0);
        for name in ["one", "two", "three"] {
            assert!(dest.pkg_dir(&format!("{name}-1.0")).join("lib").join(format!("{name}.rb")).is_file());
        }
    }

    #[test]
    fn installs_respect_declared_dependency_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut resolved = Vec::new();
        for name in ["base", "dependent"] {
            let source_dir = tmp.path().join("src").join(name);
            std::fs::create_dir_all(source_dir.join("lib")).unwrap();
            std::fs::write(source_dir.join("lib").join(format!("{name}.rb")), b"puts 1").unwrap();
            resolved.push(ResolvedSpec {
                id: PackageId::new(name, "1.0", Platform::Portable),
                source: SourceDescriptor::Path { absolute_path: source_dir },
                dependencies: if name == "dependent" { vec!["base".to_string()] } else { vec![] },
                size: None,
                checksum: None,
                needs_extensions: false,
            });
        }

        let layout = Arc::new(CacheLayout::new(tmp.path().join("cache")));
        let abi = Arc::new(AbiKey::new("rt-3.3.0"));
        let dest = Destination::new(tmp.path().join("dest"));
        let preparer = Arc::new(Preparer::new(Arc::new(HttpPool::new()), Arc::new(NoopExtensionBuilder)));

        let report = install(&resolved, &dest, layout, abi, &InstallOptions::default(), preparer).unwrap();

        assert_eq!(report.summary.failed, 0);
        assert!(dest.pkg_dir("base-1.0").join("lib/base.rb").is_file());
        assert!(dest.pkg_dir("dependent-1.0").join("lib/dependent.rb").is_file());
    }
}
