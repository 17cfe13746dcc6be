// SPDX-License-Identifier: MIT OR Apache-2.0

//! Planner (§3.5, §4.9, component C9): classifies every resolved
//! dependency into exactly one action given the current state of the
//! destination directory and the cache.

use std::collections::HashMap;

use crate::cache::layout::CacheLayout;
use crate::cache::manifest;
use crate::cache::validity::{self, Verdict};
use crate::destination::Destination;
use crate::types::{Action, AbiKey, PlanEntry, ResolvedSpec};

/// Classify every entry in `resolved` into a [`PlanEntry`] (§4.9's
/// pseudocode, applied per-spec). Built-in specs are emitted first; the
/// remaining download entries are sorted by descending estimated size so
/// the pipeline's largest fetches start first and keep workers saturated
/// throughout the run.
pub fn plan(resolved: &[ResolvedSpec], dest: &Destination, layout: &CacheLayout, abi: &AbiKey, force: bool) -> Vec<PlanEntry> {
    let mut builtins = Vec::new();
    let mut rest = Vec::new();

    for spec in resolved {
        let target_path = dest.pkg_dir(&spec.full_name());

        if force {
            purge_cached(layout, abi, spec);
        }

        let action = classify(spec, dest, layout, abi, force);
        let cached_path = matches!(action, Action::Link | Action::Build).then(|| layout.cached_dir_for(&spec.id, abi));

        let entry = PlanEntry {
            spec: spec.clone(),
            action,
            cached_path,
            target_path,
        };

        if spec.source.is_builtin() {
            builtins.push(entry);
        } else {
            rest.push(entry);
        }
    }

    rest.sort_by(|a, b| estimated_size(b).cmp(&estimated_size(a)));

    builtins.into_iter().chain(rest).collect()
}

fn classify(spec: &ResolvedSpec, dest: &Destination, layout: &CacheLayout, abi: &AbiKey, force: bool) -> Action {
    let full_name = spec.full_name();

    if spec.source.is_builtin() {
        return Action::Builtin;
    }

    if !force && dest.has_package(&full_name) {
        if spec.needs_extensions && !dest.has_extension_dir(&full_name) {
            return if cached_extension_build_exists(layout, abi, spec) { Action::Link } else { Action::Build };
        }
        return Action::Skip;
    }

    if spec.source.is_path() {
        return if spec.needs_extensions { Action::Build } else { Action::Link };
    }

    if validity::check(layout, abi, spec) == Verdict::Valid {
        return if spec.needs_extensions && !cached_extension_build_exists(layout, abi, spec) {
            Action::Build
        } else {
            Action::Link
        };
    }

    Action::Download
}

/// "a prior cached extension build exists" (§4.9): the cache entry for
/// this spec is itself valid and its manifest records that it was built
/// with extensions. Resolved as an explicit decision (§4.9 does not
/// define this phrase further) — recorded in `DESIGN.md`.
fn cached_extension_build_exists(layout: &CacheLayout, abi: &AbiKey, spec: &ResolvedSpec) -> bool {
    if validity::check(layout, abi, spec) != Verdict::Valid {
        return false;
    }
    let manifest_path = validity::manifest_path_for(layout, abi, &spec.full_name());
    manifest::read(&manifest_path).is_some_and(|m| m.build.extensions)
}

fn purge_cached(layout: &CacheLayout, abi: &AbiKey, spec: &ResolvedSpec) {
    let full_name = spec.full_name();
    let _ = std::fs::remove_dir_all(layout.cached_dir(abi, &full_name));
    let _ = std::fs::remove_file(layout.cached_spec_path(abi, &full_name));
    let _ = std::fs::remove_file(layout.cached_manifest_path(abi, &full_name));
}

/// Submission order over `plan`'s indices such that every entry appears
/// after the entries any of its declared dependency names resolved to
/// (§3.7's DAG framing of the install pipeline). Built with `scint_dag::Dag`
/// rather than a hand-rolled adjacency list: each entry is a node, an edge
/// `entry -> dependency` is added per name in `ResolvedSpec.dependencies`
/// that another plan entry's package name matches, and the order is read off
/// the transposed graph (dependencies first) via `Dag::toposort`.
///
/// A dependency name with no matching entry in `plan` is left unconstrained
/// — per §3.6, dependency names are resolver output and may point outside
/// this resolved set entirely. Returns the offending index if the declared
/// dependencies contain a cycle.
pub fn dependency_order(plan: &[PlanEntry]) -> Result<Vec<usize>, usize> {
    let mut dag: scint_dag::Dag<usize> = scint_dag::Dag::new();
    let index_by_name: HashMap<&str, usize> = plan.iter().enumerate().map(|(i, e)| (e.spec.id.name.as_str(), i)).collect();

    for i in 0..plan.len() {
        dag.add_node_or_get_index(i);
    }

    for (i, entry) in plan.iter().enumerate() {
        for dep_name in &entry.spec.dependencies {
            if let Some(&dep_idx) = index_by_name.get(dep_name.as_str()) {
                if dep_idx != i {
                    let node = dag.add_node_or_get_index(i);
                    let dep_node = dag.add_node_or_get_index(dep_idx);
                    dag.add_edge(node, dep_node);
                }
            }
        }
    }

    dag.transpose().toposort()
}

fn estimated_size(entry: &PlanEntry) -> u64 {
    if entry.action == Action::Download {
        entry.spec.size.unwrap_or(0)
    } else {
        0
    }
}
