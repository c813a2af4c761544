// SPDX-License-Identifier: MPL-2.0

//! The backtracking driver.
//!
//! The search runs as a loop over three stages (`Step`, `Outer`,
//! `Inner`) with an explicit stack of prior frames instead of native
//! recursion, so deep dependency graphs cannot overflow the host
//! stack and backtracking restores earlier state verbatim.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{Dependency, ExploredPackageCache, ResolvedPackage, VersionCache};
use crate::conflicts::ConflictTracker;
use crate::error::ResolverError;
use crate::filter::{filter_by_restrictions, find_first_incompatibility};
use crate::frameworks::{filter_restrictions, FrameworkRestriction, FrameworkRestrictions, InstallSettings};
use crate::internal::step::{calc_open_requirements, ResolverStep};
use crate::package::{GroupName, PackageName};
use crate::prefetch::{RequestMemo, VersionLister};
use crate::queue::{CancellationToken, WorkPriority};
use crate::requirement::{PackageRequirement, RequirementSource, ResolverStrategy, UpdateMode};
use crate::resolution::{cleanup_names, ConflictInfo, Resolution};
use crate::selector::compatible_versions;
use crate::type_aliases::Set;

/// Everything the driver needs but never mutates.
pub(crate) struct MachineContext {
    pub(crate) memo: RequestMemo,
    pub(crate) group: GroupName,
    pub(crate) global_direct: Option<ResolverStrategy>,
    pub(crate) global_transitive: Option<ResolverStrategy>,
    pub(crate) global_restrictions: FrameworkRestrictions,
    pub(crate) update_mode: UpdateMode,
    pub(crate) request_timeout: std::time::Duration,
    pub(crate) token: CancellationToken,
}

/// The mutable caches shared across the whole search. Steps are
/// immutable snapshots; these accumulate monotonically.
pub(crate) struct StackPack {
    pub(crate) explored: ExploredPackageCache,
    pub(crate) conflicts: ConflictTracker,
}

impl StackPack {
    pub(crate) fn new() -> Self {
        Self {
            explored: ExploredPackageCache::new(),
            conflicts: ConflictTracker::new(),
        }
    }
}

/// What one pass of the search produced.
pub(crate) struct SearchOutcome {
    pub(crate) resolution: Resolution,
    pub(crate) errors: Vec<ResolverError>,
    pub(crate) try_relaxed: bool,
}

#[derive(Debug, Clone, Copy)]
struct StepFlags {
    ready: bool,
    use_unlisted: bool,
    has_unlisted: bool,
    force_break: bool,
    first_trial: bool,
    unlisted_search: bool,
}

impl StepFlags {
    fn fresh_level(force_break: bool) -> Self {
        Self {
            ready: false,
            use_unlisted: false,
            has_unlisted: false,
            force_break,
            first_trial: true,
            unlisted_search: false,
        }
    }
}

/// The per-level working state threaded through the stages.
#[derive(Clone)]
struct ConflictState {
    status: Resolution,
    last_conflict_reported: Instant,
    try_relaxed: bool,
    global_override: bool,
    /// Replayed known conflicts detected at `Step` entry; distinct from
    /// fresh conflicts, which only live in `status`.
    conflicts: BTreeSet<PackageRequirement>,
    versions_to_explore: VecDeque<VersionCache>,
    errors: Vec<ResolverError>,
}

/// One suspended decision level, restored verbatim on backtracking.
struct Frame {
    conflict: ConflictState,
    step: ResolverStep,
    requirement: PackageRequirement,
    compatible_versions: Vec<VersionCache>,
    flags: StepFlags,
}

enum Stage {
    Step,
    Outer,
    Inner,
}

fn keep_looping(flags: &StepFlags, conflict: &ConflictState) -> bool {
    if flags.force_break || conflict.status.is_done() {
        return false;
    }
    if conflict.versions_to_explore.is_empty() {
        return false;
    }
    flags.first_trial || conflict.conflicts.is_empty()
}

/// Drive the search from `start` to a resolution or a conflict.
/// `Err` is reserved for fatal conditions (invariant violations,
/// listing failures outside candidate exploration).
pub(crate) async fn run(
    ctx: &MachineContext,
    stackpack: &mut StackPack,
    start: ResolverStep,
) -> Result<SearchOutcome, ResolverError> {
    let lister = ctx.memo.version_lister();
    let package_filter = ctx.update_mode.package_filter(&ctx.group);

    let mut current_step = start;
    let mut current_requirement = match current_step.open_requirements.iter().next() {
        Some(first) => first.clone(),
        None => {
            return Ok(SearchOutcome {
                resolution: Resolution::Ok(cleanup_names(current_step.current_resolution)),
                errors: Vec::new(),
                try_relaxed: false,
            })
        }
    };
    let mut current_conflict = ConflictState {
        status: conflict_status(
            &current_step,
            BTreeSet::new(),
            &current_requirement,
            &lister,
        ),
        last_conflict_reported: Instant::now(),
        try_relaxed: false,
        global_override: false,
        conflicts: BTreeSet::new(),
        versions_to_explore: VecDeque::new(),
        errors: Vec::new(),
    };
    let mut compatible: Vec<VersionCache> = Vec::new();
    let mut flags = StepFlags::fresh_level(false);
    let mut prior_steps: Vec<Frame> = Vec::new();
    let mut stage = Stage::Step;

    loop {
        if ctx.token.is_cancelled() {
            flags.force_break = true;
        }
        match stage {
            Stage::Step => {
                if current_step.open_requirements.is_empty() {
                    let model = cleanup_names(current_step.current_resolution.clone());
                    return Ok(SearchOutcome {
                        resolution: Resolution::Ok(model),
                        errors: current_conflict.errors,
                        try_relaxed: current_conflict.try_relaxed,
                    });
                }
                current_requirement = stackpack
                    .conflicts
                    .current_requirement(package_filter, &current_step.open_requirements)
                    .expect("non-empty open set")
                    .clone();
                let replayed = stackpack
                    .conflicts
                    .get_conflicts(&current_step, &current_requirement);
                current_conflict.conflicts = replayed.clone();
                current_conflict.status = conflict_status(
                    &current_step,
                    replayed.clone(),
                    &current_requirement,
                    &lister,
                );
                if replayed.is_empty() {
                    let selection = compatible_versions(
                        &ctx.memo,
                        &current_step,
                        &current_requirement,
                        ctx.global_direct,
                        ctx.global_transitive,
                        ctx.request_timeout,
                    )
                    .await?;
                    log::debug!(
                        "{} candidate versions for {}",
                        selection.versions.len(),
                        current_requirement
                    );
                    current_conflict.global_override = selection.global_override;
                    current_conflict.try_relaxed |= selection.try_relaxed;
                    compatible = selection.versions.clone();
                    current_conflict.versions_to_explore = selection.versions.into();
                    if current_conflict.versions_to_explore.is_empty() {
                        // no admissible version at all: the competing
                        // requirements on this name are the conflict
                        let conflict_set =
                            requirements_on_name(&current_step, &current_requirement.name);
                        current_conflict.status = Resolution::Conflict(Box::new(ConflictInfo {
                            resolve_step: current_step.clone(),
                            requirement_set: conflict_set.clone(),
                            requirement: current_requirement.clone(),
                            version_lister: Arc::clone(&lister),
                        }));
                        let report = current_conflict.status.clone();
                        current_conflict.last_conflict_reported =
                            stackpack.conflicts.boost_conflicts(
                                &current_step.filtered_versions,
                                &current_requirement,
                                &conflict_set,
                                current_conflict.last_conflict_reported,
                                move || report.get_error_text(true),
                            );
                    }
                    flags = StepFlags::fresh_level(flags.force_break);
                    stage = Stage::Outer;
                } else {
                    log::debug!(
                        "replaying known conflict for {}: {} requirements",
                        current_requirement.name,
                        replayed.len()
                    );
                    let root_conflict = replayed
                        .iter()
                        .next()
                        .is_some_and(|c| c.parent.is_root() && *c == current_requirement);
                    if root_conflict
                        || !fuse_conflicts(
                            &mut prior_steps,
                            &mut current_conflict,
                            &mut current_step,
                            &mut current_requirement,
                            &mut compatible,
                            &mut flags,
                        )
                    {
                        return Ok(SearchOutcome {
                            resolution: current_conflict.status,
                            errors: current_conflict.errors,
                            try_relaxed: current_conflict.try_relaxed,
                        });
                    }
                    stage = Stage::Outer;
                }
            }
            Stage::Outer => {
                if flags.ready {
                    if !fuse_conflicts(
                        &mut prior_steps,
                        &mut current_conflict,
                        &mut current_step,
                        &mut current_requirement,
                        &mut compatible,
                        &mut flags,
                    ) {
                        return Ok(SearchOutcome {
                            resolution: current_conflict.status,
                            errors: current_conflict.errors,
                            try_relaxed: current_conflict.try_relaxed,
                        });
                    }
                    // stay in Outer with the restored level
                } else {
                    flags.first_trial = true;
                    stage = Stage::Inner;
                }
            }
            Stage::Inner => {
                if !keep_looping(&flags, &current_conflict) {
                    if !flags.use_unlisted && flags.has_unlisted && !flags.unlisted_search {
                        // retry the level accepting unlisted candidates
                        flags.use_unlisted = true;
                        flags.unlisted_search = true;
                        flags.ready = false;
                        flags.first_trial = true;
                        current_conflict.versions_to_explore = compatible.clone().into();
                    } else {
                        flags.ready = true;
                        flags.unlisted_search = true;
                    }
                    stage = Stage::Outer;
                    continue;
                }
                flags.first_trial = false;
                let version_cache = current_conflict
                    .versions_to_explore
                    .pop_front()
                    .expect("keep_looping checked non-empty");
                match explore_package(ctx, stackpack, &current_requirement, &version_cache).await {
                    Err(error) => {
                        // candidate rejected, error kept as a warning
                        log::debug!("{error}");
                        current_conflict.errors.push(error);
                    }
                    Ok((already_explored, explored)) => {
                        if explored.unlisted {
                            if !already_explored {
                                log::debug!(
                                    "{} {} is unlisted",
                                    explored.name,
                                    explored.version
                                );
                            }
                            flags.has_unlisted = true;
                        }
                        if !already_explored {
                            ctx.memo
                                .prefetch(&current_requirement.sources, &explored.dependencies);
                        }
                        if explored.unlisted && !flags.use_unlisted {
                            // skipped until the unlisted pass
                            continue;
                        }
                        let incompatibility = current_step
                            .current_resolution
                            .values()
                            .find_map(|resolved| {
                                find_first_incompatibility(
                                    &current_step,
                                    &explored.dependencies,
                                    resolved,
                                )
                                .cloned()
                            });
                        match incompatibility {
                            None => {
                                let next_open = calc_open_requirements(
                                    &explored,
                                    &ctx.global_restrictions,
                                    &version_cache,
                                    &current_requirement,
                                    &current_step,
                                );
                                if next_open == current_step.open_requirements {
                                    return Err(ResolverError::LoopDetected {
                                        package: current_requirement.name.clone(),
                                    });
                                }
                                log::debug!(
                                    "accepted {} {}",
                                    explored.name,
                                    explored.version
                                );
                                let mut next_step = current_step.clone();
                                next_step.filtered_versions.insert(
                                    current_requirement.name.clone(),
                                    (vec![version_cache.clone()], current_conflict.global_override),
                                );
                                next_step
                                    .current_resolution
                                    .insert(explored.name.clone(), explored);
                                next_step
                                    .closed_requirements
                                    .insert(current_requirement.clone());
                                next_step.open_requirements = next_open;
                                prior_steps.push(Frame {
                                    conflict: current_conflict.clone(),
                                    step: std::mem::take(&mut current_step),
                                    requirement: current_requirement.clone(),
                                    compatible_versions: compatible.clone(),
                                    flags,
                                });
                                current_step = next_step;
                                stage = Stage::Step;
                            }
                            Some(conflicting_dependency) => {
                                let conflict_set = conflict_with_resolution(
                                    &current_step,
                                    &current_requirement,
                                    &explored,
                                    &version_cache,
                                    &conflicting_dependency,
                                );
                                log::debug!(
                                    "conflict accepting {} {}: {} requirements on {}",
                                    explored.name,
                                    explored.version,
                                    conflict_set.len(),
                                    conflicting_dependency.0
                                );
                                current_conflict.status =
                                    Resolution::Conflict(Box::new(ConflictInfo {
                                        resolve_step: current_step.clone(),
                                        requirement_set: conflict_set.clone(),
                                        requirement: current_requirement.clone(),
                                        version_lister: Arc::clone(&lister),
                                    }));
                                let report = current_conflict.status.clone();
                                current_conflict.last_conflict_reported =
                                    stackpack.conflicts.boost_conflicts(
                                        &current_step.filtered_versions,
                                        &current_requirement,
                                        &conflict_set,
                                        current_conflict.last_conflict_reported,
                                        move || report.get_error_text(true),
                                    );
                            }
                        }
                    }
                }
            }
        }
    }
}

fn conflict_status(
    step: &ResolverStep,
    conflicts: BTreeSet<PackageRequirement>,
    requirement: &PackageRequirement,
    lister: &VersionLister,
) -> Resolution {
    Resolution::Conflict(Box::new(ConflictInfo {
        resolve_step: step.clone(),
        requirement_set: conflicts,
        requirement: requirement.clone(),
        version_lister: Arc::clone(lister),
    }))
}

fn requirements_on_name(step: &ResolverStep, name: &PackageName) -> BTreeSet<PackageRequirement> {
    step.open_requirements
        .iter()
        .chain(step.closed_requirements.iter())
        .filter(|r| r.name == *name)
        .cloned()
        .collect()
}

/// Jump back to the nearest prior decision involved in the failing
/// conflict: pop frames until one whose requirement name occurs in the
/// conflict set or in any of its ancestor graphs. `false` means no
/// prior decision is involved and the conflict is final.
fn fuse_conflicts(
    prior_steps: &mut Vec<Frame>,
    current_conflict: &mut ConflictState,
    current_step: &mut ResolverStep,
    current_requirement: &mut PackageRequirement,
    compatible: &mut Vec<VersionCache>,
    flags: &mut StepFlags,
) -> bool {
    let conflicts = current_conflict.status.get_conflicts();
    let names: Set<&PackageName> = conflicts
        .iter()
        .flat_map(|c| {
            c.graph
                .iter()
                .map(|ancestor| &ancestor.name)
                .chain(std::iter::once(&c.name))
        })
        .collect();
    while let Some(frame) = prior_steps.pop() {
        if names.contains(&frame.requirement.name) || conflicts.contains(&frame.requirement) {
            log::debug!("backtracking to {}", frame.requirement.name);
            current_conflict.versions_to_explore = frame.conflict.versions_to_explore;
            current_conflict.global_override = frame.conflict.global_override;
            *current_step = frame.step;
            *current_requirement = frame.requirement;
            *compatible = frame.compatible_versions;
            *flags = frame.flags;
            return true;
        }
    }
    false
}

/// Fetch (or reuse) the record for a candidate and derive the resolved
/// package under the requirement's effective framework restrictions.
/// Errors reject only this candidate.
async fn explore_package(
    ctx: &MachineContext,
    stackpack: &mut StackPack,
    current: &PackageRequirement,
    version_cache: &VersionCache,
) -> Result<(bool, ResolvedPackage), ResolverError> {
    if let Some(existing) = stackpack
        .explored
        .get(&current.name, &version_cache.version)
    {
        let updated = update_restrictions(ctx, current, existing.clone());
        stackpack.explored.insert(updated.clone());
        return Ok((true, updated));
    }
    log::debug!(" - exploring {} {}", current.name, version_cache.version);
    let effective_restrictions = filter_restrictions(
        &current.settings.framework_restrictions,
        &ctx.global_restrictions,
    );
    let handle = ctx.memo.package_details(
        &version_cache.sources,
        &current.name,
        &version_cache.version,
        WorkPriority::LikelyRequired,
    );
    let details = handle
        .get_and_report(&current.name, ctx.request_timeout)
        .await
        .map_err(|err| match err {
            ResolverError::Source(source) => ResolverError::Explore {
                package: current.name.clone(),
                version: version_cache.version.clone(),
                source,
            },
            other => other,
        })?;
    let dependencies = filter_by_restrictions(
        &effective_restrictions.explicit_restriction(),
        &details.direct_dependencies,
    );
    let package = ResolvedPackage {
        name: details.name,
        version: version_cache.version.clone(),
        dependencies,
        unlisted: details.unlisted,
        is_runtime_dependency: false,
        is_cli_tool: current.is_cli_tool,
        settings: InstallSettings {
            framework_restrictions: effective_restrictions,
        },
        source: details.source,
    };
    stackpack.explored.insert(package.clone());
    Ok((false, package))
}

/// A cache hit may come from a path with narrower restrictions; widen
/// the stored record so the union of observed restrictions survives.
fn update_restrictions(
    ctx: &MachineContext,
    current: &PackageRequirement,
    mut package: ResolvedPackage,
) -> ResolvedPackage {
    let has_global_restrictions =
        ctx.global_restrictions.explicit_restriction() != FrameworkRestriction::NoRestriction;
    let stored = package.settings.framework_restrictions.explicit_restriction();
    let incoming = current.settings.framework_restrictions.explicit_restriction();
    let merged = if !has_global_restrictions
        && (stored == FrameworkRestriction::NoRestriction
            || incoming == FrameworkRestriction::NoRestriction)
    {
        FrameworkRestriction::NoRestriction
    } else {
        stored.or(&incoming)
    };
    package.settings.framework_restrictions = FrameworkRestrictions::Explicit(merged);
    package
}

/// The conflict set for a candidate rejected against the current
/// resolution: every requirement on the conflicting name plus the
/// failing dependency edge itself.
fn conflict_with_resolution(
    step: &ResolverStep,
    current: &PackageRequirement,
    explored: &ResolvedPackage,
    version_cache: &VersionCache,
    conflicting: &Dependency,
) -> BTreeSet<PackageRequirement> {
    let (dep_name, dep_requirement, dep_restrictions) = conflicting;
    let mut conflict_set = requirements_on_name(step, dep_name);
    let mut edge = current.clone();
    edge.name = dep_name.clone();
    edge.version_requirement = dep_requirement.clone();
    edge.parent = RequirementSource::Package {
        name: current.name.clone(),
        version: version_cache.version.clone(),
        source: explored.source.clone(),
    };
    edge.graph = {
        let mut graph = (*current.graph).clone();
        graph.insert(current.clone());
        Arc::new(graph)
    };
    edge.transitive_prereleases =
        current.transitive_prereleases && explored.version.is_prerelease();
    edge.settings.framework_restrictions = dep_restrictions.clone();
    conflict_set.insert(edge);
    conflict_set
}
