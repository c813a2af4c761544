// SPDX-License-Identifier: MPL-2.0

//! The outcome of a resolver run, and the report rendered from a
//! conflict.

use std::collections::BTreeSet;
use std::fmt;

use crate::constraints::PreReleaseStatus;
use crate::error::ResolverError;
use crate::internal::step::ResolverStep;
use crate::package::PackageName;
use crate::prefetch::VersionLister;
use crate::requirement::PackageRequirement;
use crate::type_aliases::{Map, PackageResolution};

/// Everything known about a resolution failure.
#[derive(Clone)]
pub struct ConflictInfo {
    /// The step the search was in when it gave up.
    pub resolve_step: ResolverStep,
    /// The requirements identified as mutually unsatisfiable. May be
    /// empty when the failure was "no versions at all" for one name.
    pub requirement_set: BTreeSet<PackageRequirement>,
    /// The requirement that triggered the failure.
    pub requirement: PackageRequirement,
    /// Snapshot reader over the versions known at failure time.
    pub version_lister: VersionLister,
}

impl fmt::Debug for ConflictInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictInfo")
            .field("requirement", &self.requirement)
            .field("requirement_set", &self.requirement_set)
            .finish_non_exhaustive()
    }
}

/// Either a complete assignment of versions or a conflict explanation.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// One version per transitively reachable package.
    Ok(PackageResolution),
    /// No consistent assignment exists on the explored paths.
    Conflict(Box<ConflictInfo>),
}

impl Resolution {
    /// Whether the search finished with a model.
    pub fn is_done(&self) -> bool {
        matches!(self, Resolution::Ok(_))
    }

    /// The resolved model, if any.
    pub fn as_ok(&self) -> Option<&PackageResolution> {
        match self {
            Resolution::Ok(model) => Some(model),
            Resolution::Conflict(_) => None,
        }
    }

    /// The requirements in conflict. When the recorded set is empty the
    /// competing requirements for the triggering name are derived from
    /// the failing step instead.
    pub fn get_conflicts(&self) -> BTreeSet<PackageRequirement> {
        match self {
            Resolution::Ok(_) => BTreeSet::new(),
            Resolution::Conflict(info) => {
                if !info.requirement_set.is_empty() {
                    return info.requirement_set.clone();
                }
                info.resolve_step
                    .closed_requirements
                    .iter()
                    .chain(info.resolve_step.open_requirements.iter())
                    .filter(|r| r.name == info.requirement.name)
                    .cloned()
                    .collect()
            }
        }
    }

    /// Render the failure for users: the resolved packages so far (when
    /// `show_resolved`), the competing requirements with their parents,
    /// and the versions known for the name.
    pub fn get_error_text(&self, show_resolved: bool) -> String {
        let Resolution::Conflict(info) = self else {
            return String::new();
        };
        let mut out = String::new();
        let mut line = |s: String| {
            out.push_str(&s);
            out.push('\n');
        };
        if show_resolved && !info.resolve_step.current_resolution.is_empty() {
            line("  Resolved packages:".to_string());
            let mut resolved: Vec<_> = info.resolve_step.current_resolution.values().collect();
            resolved.sort_by(|a, b| a.name.cmp(&b.name));
            for package in resolved {
                line(format!("   - {} {}", package.name, package.version));
            }
        }
        let conflicts = self.get_conflicts();
        let requires_prereleases = conflicts
            .iter()
            .any(|r| r.version_requirement.prereleases != PreReleaseStatus::No);
        let mut requested = format!(
            "  Could not resolve package {} {}",
            info.requirement.name, info.requirement.version_requirement.range
        );
        if requires_prereleases {
            requested.push_str(" (prereleases required)");
        }
        requested.push(':');
        line(requested);
        for conflict in &conflicts {
            line(format!(
                "   - {} requested package {}: {}",
                conflict.parent, conflict.name, conflict.version_requirement
            ));
        }
        match (*info.version_lister)(&info.requirement.name) {
            Some(versions) if !versions.is_empty() => {
                line(format!("  Available versions of {}:", info.requirement.name));
                for version in versions {
                    line(format!("   - {version}"));
                }
            }
            _ => line(format!(
                "  No versions available for {}.",
                info.requirement.name
            )),
        }
        out
    }
}

/// What [resolve](crate::resolver::resolve) hands back: the resolution
/// plus the non-fatal errors captured along the way (source failures
/// observed while exploring rejected candidates).
#[derive(Debug, Clone)]
pub struct ResolverResult {
    /// The resolution or conflict.
    pub resolution: Resolution,
    /// Non-fatal errors, reported as warnings on success.
    pub errors: Vec<ResolverError>,
}

impl ResolverResult {
    /// Whether the search finished with a model.
    pub fn is_done(&self) -> bool {
        self.resolution.is_done()
    }

    /// The resolved model, or an error wrapping the conflict report
    /// together with the accumulated non-fatal errors.
    pub fn ok_or_fail(self) -> Result<PackageResolution, ResolverError> {
        match self.resolution {
            Resolution::Ok(model) => Ok(model),
            Resolution::Conflict(_) => {
                let mut text = String::from("resolution failed:\n");
                text.push_str(&self.resolution.get_error_text(true));
                if !self.errors.is_empty() {
                    text.push_str("  Errors during search:\n");
                    for err in &self.errors {
                        text.push_str(&format!("   - {err}\n"));
                    }
                }
                Err(ResolverError::NoSolution(text))
            }
        }
    }
}

/// Rewrite every resolved package's dependency entries so the name
/// token matches the canonical casing bound in the resolution. Names
/// compare case-insensitively, but the user-visible casing is the one
/// the feed reported for the resolved package.
pub fn cleanup_names(mut resolution: PackageResolution) -> PackageResolution {
    // The pairs look like an identity map, but `PackageName` hashes and
    // compares case-insensitively: looking up a dependency's casing
    // returns the casing the resolution key was stored under.
    let canonical: Map<PackageName, PackageName> = resolution
        .keys()
        .map(|name| (name.clone(), name.clone()))
        .collect();
    for package in resolution.values_mut() {
        package.dependencies = package
            .dependencies
            .iter()
            .map(|(name, requirement, restrictions)| {
                let name = canonical.get(name).cloned().unwrap_or_else(|| name.clone());
                (name, requirement.clone(), restrictions.clone())
            })
            .collect();
    }
    resolution
}
