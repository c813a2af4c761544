// SPDX-License-Identifier: MPL-2.0

//! The immutable search step and the frontier computation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::{Dependency, ResolvedPackage, VersionCache};
use crate::frameworks::{filter_restrictions, FrameworkRestriction, FrameworkRestrictions};
use crate::package::PackageName;
use crate::requirement::{PackageRequirement, RequirementSource};
use crate::type_aliases::{Map, PackageResolution};

/// A snapshot of the search: what has been decided, what is still open.
/// Steps are immutable; descending pushes the previous step onto the
/// prior-step stack and backtracking restores it verbatim.
#[derive(Debug, Clone, Default)]
pub struct ResolverStep {
    /// Whether this is the relaxed second pass.
    pub relax: bool,
    /// Per name: the candidate list the search filtered down to, and
    /// whether the name is pinned by a global override.
    pub filtered_versions: Map<PackageName, (Vec<VersionCache>, bool)>,
    /// The packages chosen on this path, one per name.
    pub current_resolution: PackageResolution,
    /// Requirements already satisfied on this path.
    pub closed_requirements: BTreeSet<PackageRequirement>,
    /// The frontier: requirements still to satisfy.
    pub open_requirements: BTreeSet<PackageRequirement>,
}

impl ResolverStep {
    /// The starting step for a set of root requirements.
    pub(crate) fn start(relax: bool, roots: BTreeSet<PackageRequirement>) -> Self {
        Self {
            relax,
            filtered_versions: Map::default(),
            current_resolution: PackageResolution::default(),
            closed_requirements: BTreeSet::new(),
            open_requirements: roots,
        }
    }
}

/// The next open-requirement frontier after accepting `explored` for
/// the requirement `dependency`.
///
/// The explored package's dependency list is compressed per name, each
/// entry becomes a requirement inheriting the satisfied requirement's
/// strategy overrides and sources, and entries subsumed by the closed
/// or open sets are dropped before the residual frontier is added back.
pub(crate) fn calc_open_requirements(
    explored: &ResolvedPackage,
    global_restrictions: &FrameworkRestrictions,
    version_cache: &VersionCache,
    dependency: &PackageRequirement,
    step: &ResolverStep,
) -> BTreeSet<PackageRequirement> {
    let compressed = compress_dependencies(explored);

    let graph = {
        let mut graph = (*dependency.graph).clone();
        graph.insert(dependency.clone());
        Arc::new(graph)
    };
    let parent = RequirementSource::Package {
        name: dependency.name.clone(),
        version: version_cache.version.clone(),
        source: explored.source.clone(),
    };
    let transitive_prereleases =
        dependency.transitive_prereleases && explored.version.is_prerelease();

    let mut next: BTreeSet<PackageRequirement> = step
        .open_requirements
        .iter()
        .filter(|r| *r != dependency)
        .cloned()
        .collect();

    for (name, version_requirement, dependency_restrictions) in compressed {
        let combined = filter_restrictions(
            &filter_restrictions(
                &dependency_restrictions,
                &explored.settings.framework_restrictions,
            ),
            global_restrictions,
        );
        let framework_restrictions =
            if combined == FrameworkRestrictions::Explicit(FrameworkRestriction::NoRestriction) {
                explored.settings.framework_restrictions.clone()
            } else {
                combined
            };
        let mut new_requirement = dependency.clone();
        new_requirement.name = name;
        new_requirement.version_requirement = version_requirement;
        new_requirement.parent = parent.clone();
        new_requirement.graph = Arc::clone(&graph);
        new_requirement.transitive_prereleases = transitive_prereleases;
        new_requirement.settings.framework_restrictions = framework_restrictions;

        let subsumed_by_closed = step.closed_requirements.iter().any(|closed| {
            closed.name == new_requirement.name
                && closed.settings.framework_restrictions
                    == new_requirement.settings.framework_restrictions
                && (*closed == new_requirement
                    || new_requirement
                        .version_requirement
                        .range
                        .is_included_in(&closed.version_requirement.range)
                    || closed.version_requirement.range.is_global_override())
        });
        if subsumed_by_closed {
            continue;
        }
        let already_open = step.open_requirements.iter().any(|open| {
            open.name == new_requirement.name
                && open.settings.framework_restrictions
                    == new_requirement.settings.framework_restrictions
                && (*open == new_requirement
                    || open.version_requirement.range.is_global_override())
        });
        if already_open {
            continue;
        }
        next.insert(new_requirement);
    }
    next
}

/// Packages occasionally declare several dependencies on the same name
/// (one per framework group). Entries sharing a prerelease policy merge
/// their restrictions with `Or` and keep the wider range; otherwise the
/// later occurrence wins.
fn compress_dependencies(explored: &ResolvedPackage) -> Vec<Dependency> {
    let mut order: Vec<PackageName> = Vec::new();
    let mut by_name: Map<PackageName, Dependency> = Map::default();
    for dep in &explored.dependencies {
        let (name, requirement, restrictions) = dep;
        match by_name.get_mut(name) {
            None => {
                order.push(name.clone());
                by_name.insert(name.clone(), dep.clone());
            }
            Some(existing) => {
                let (_, existing_requirement, existing_restrictions) = existing.clone();
                if requirement.prereleases == existing_requirement.prereleases {
                    let merged = FrameworkRestrictions::Explicit(
                        restrictions
                            .explicit_restriction()
                            .or(&existing_restrictions.explicit_restriction()),
                    );
                    if existing_requirement.range.is_included_in(&requirement.range) {
                        *existing = (name.clone(), requirement.clone(), merged);
                    } else if requirement.range.is_included_in(&existing_requirement.range) {
                        *existing = (name.clone(), existing_requirement, merged);
                    } else {
                        *existing = dep.clone();
                    }
                } else {
                    *existing = dep.clone();
                }
            }
        }
    }
    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}
