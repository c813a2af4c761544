// SPDX-License-Identifier: MPL-2.0

//! Filtering of declared dependency sets.

use crate::cache::{Dependency, DependencySet, ResolvedPackage};
use crate::frameworks::FrameworkRestriction;
use crate::internal::step::ResolverStep;

/// Keep the dependencies whose framework restriction overlaps the
/// effective restriction `r`.
///
/// Checking represented-set overlap avoids canonicalizing `And(r, dr)`
/// while still rejecting edges that cannot apply to any kept framework.
pub fn filter_by_restrictions(
    restriction: &FrameworkRestriction,
    dependencies: &DependencySet,
) -> DependencySet {
    if *restriction == FrameworkRestriction::NoRestriction {
        return dependencies.clone();
    }
    dependencies
        .iter()
        .filter(|(_, _, dr)| restriction.intersects(&dr.explicit_restriction()))
        .cloned()
        .collect()
}

/// The first dependency on `package.name` that the already-chosen
/// version of `package` fails to satisfy, or `None` when the candidate
/// carrying `dependencies` is compatible with `package`.
///
/// Prereleases are admitted when any requirement for the name in the
/// step (closed or open) carries the transitive-prereleases flag, and
/// the check is skipped entirely when the name is pinned by a global
/// override.
pub(crate) fn find_first_incompatibility<'a>(
    step: &ResolverStep,
    dependencies: &'a DependencySet,
    package: &ResolvedPackage,
) -> Option<&'a Dependency> {
    if let Some((_, true)) = step.filtered_versions.get(&package.name) {
        return None;
    }
    let allow_prereleases = step
        .closed_requirements
        .iter()
        .chain(step.open_requirements.iter())
        .any(|r| r.name == package.name && r.transitive_prereleases);
    dependencies
        .iter()
        .filter(|(name, _, _)| *name == package.name)
        .find(|(_, requirement, _)| !requirement.is_in_range(&package.version, allow_prereleases))
}
