// SPDX-License-Identifier: MPL-2.0

//! Package requirements: the constraints sitting on the resolver frontier.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::constraints::{PreReleaseStatus, VersionRequirement};
use crate::frameworks::InstallSettings;
use crate::package::{GroupName, PackageName, PackageSource};
use crate::version::SemVer;

/// The policy used to pick among several admissible versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolverStrategy {
    /// Prefer the lowest admissible version.
    Min,
    /// Prefer the highest admissible version.
    Max,
}

/// Left-biased combination of strategy overrides.
pub fn combine_strategies(
    left: Option<ResolverStrategy>,
    right: Option<ResolverStrategy>,
) -> Option<ResolverStrategy> {
    left.or(right)
}

/// Where a requirement comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequirementSource {
    /// Stated directly in the root dependency declaration.
    RootFile,
    /// Introduced by a resolved package's dependency list.
    Package {
        /// The depending package.
        name: PackageName,
        /// Its resolved version.
        version: SemVer,
        /// The source it was retrieved from.
        source: PackageSource,
    },
}

impl RequirementSource {
    /// Whether the requirement was stated at the root.
    pub fn is_root(&self) -> bool {
        matches!(self, RequirementSource::RootFile)
    }
}

impl Display for RequirementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementSource::RootFile => f.write_str("dependencies file"),
            RequirementSource::Package { name, version, .. } => write!(f, "{name} {version}"),
        }
    }
}

/// How a resolver run is allowed to move already-locked packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    /// First installation, no lock to preserve.
    Install,
    /// Update everything.
    UpdateAll,
    /// Update only the given group.
    UpdateGroup(GroupName),
    /// Update only the packages of the group matching the filter.
    UpdateFiltered(GroupName, PackageFilter),
}

impl UpdateMode {
    /// The filter to consult during requirement selection, if the mode
    /// carries one for the given group.
    pub fn package_filter(&self, group: &GroupName) -> Option<&PackageFilter> {
        match self {
            UpdateMode::UpdateFiltered(g, filter) if g == group => Some(filter),
            _ => None,
        }
    }
}

/// Selects package names for a filtered update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageFilter {
    /// A single package.
    Exact(PackageName),
    /// A `*` wildcard pattern over the lowercased name.
    Wildcard(String),
}

impl PackageFilter {
    /// Whether the filter selects the given name.
    pub fn matches(&self, name: &PackageName) -> bool {
        match self {
            PackageFilter::Exact(n) => n == name,
            PackageFilter::Wildcard(pattern) => {
                wildcard_match(&pattern.to_lowercase(), name.compare_string())
            }
        }
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == text,
        Some((prefix, rest)) => {
            if !text.starts_with(prefix) {
                return false;
            }
            let text = &text[prefix.len()..];
            if rest.is_empty() {
                return true;
            }
            (0..=text.len()).any(|i| wildcard_match(rest, &text[i..]))
        }
    }
}

/// One constraint on the resolver frontier.
///
/// Equality and ordering deliberately ignore `sources` and `graph`:
/// two requirements with the same constraint content collapse in the
/// open set even when they were reached along different source lists.
#[derive(Debug, Clone)]
pub struct PackageRequirement {
    /// The constrained package.
    pub name: PackageName,
    /// The admissible versions.
    pub version_requirement: VersionRequirement,
    /// Strategy override for direct dependencies, from the declaration.
    pub resolver_strategy_for_direct: Option<ResolverStrategy>,
    /// Strategy override applied to transitive dependencies.
    pub resolver_strategy_for_transitives: Option<ResolverStrategy>,
    /// Where the requirement comes from.
    pub parent: RequirementSource,
    /// The requirements on the ancestor path; guards against cycles and
    /// scopes conflicts during backtracking.
    pub graph: Arc<BTreeSet<PackageRequirement>>,
    /// The feeds to ask about this package.
    pub sources: Vec<PackageSource>,
    /// Whether the package is a CLI tool rather than a library reference.
    pub is_cli_tool: bool,
    /// Whether a prerelease ancestor opened this requirement (and its
    /// descendants) to prerelease versions.
    pub transitive_prereleases: bool,
    /// Framework restrictions and related settings.
    pub settings: InstallSettings,
}

impl PackageRequirement {
    /// A requirement stated at the root.
    pub fn root(
        name: impl Into<PackageName>,
        version_requirement: VersionRequirement,
        sources: Vec<PackageSource>,
    ) -> Self {
        Self {
            name: name.into(),
            version_requirement,
            resolver_strategy_for_direct: None,
            resolver_strategy_for_transitives: None,
            parent: RequirementSource::RootFile,
            graph: Arc::new(BTreeSet::new()),
            sources,
            is_cli_tool: false,
            transitive_prereleases: false,
            settings: InstallSettings::default(),
        }
    }

    /// Distance from the root: 0 for root requirements, otherwise the
    /// length of the ancestor path.
    pub fn depth(&self) -> usize {
        self.graph.len()
    }

    /// The same requirement under a different prerelease policy.
    pub fn including_prereleases(&self, status: PreReleaseStatus) -> Self {
        let mut req = self.clone();
        req.version_requirement = req.version_requirement.including_prereleases(status);
        req
    }

    /// The composite ordering used to pick the next requirement to
    /// satisfy. `boost_*` are negative for names with conflict history,
    /// pulling historically troublesome packages to the front.
    pub fn compare(
        x: &PackageRequirement,
        y: &PackageRequirement,
        package_filter: Option<&PackageFilter>,
        boost_x: i32,
        boost_y: i32,
    ) -> Ordering {
        let global = |r: &PackageRequirement| !r.version_requirement.range.is_global_override();
        (global(x), x.depth())
            .cmp(&(global(y), y.depth()))
            .then_with(|| match package_filter {
                Some(filter) => match (filter.matches(&x.name), filter.matches(&y.name)) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                },
                None => Ordering::Equal,
            })
            .then_with(|| {
                y.resolver_strategy_for_direct
                    .cmp(&x.resolver_strategy_for_direct)
            })
            .then_with(|| {
                y.resolver_strategy_for_transitives
                    .cmp(&x.resolver_strategy_for_transitives)
            })
            .then_with(|| boost_x.cmp(&boost_y))
            .then_with(|| y.version_requirement.cmp(&x.version_requirement))
            .then_with(|| x.parent.cmp(&y.parent))
            .then_with(|| x.name.cmp(&y.name))
            .then_with(|| x.transitive_prereleases.cmp(&y.transitive_prereleases))
            .then_with(|| x.is_cli_tool.cmp(&y.is_cli_tool))
            .then_with(|| x.settings.cmp(&y.settings))
    }
}

impl PartialEq for PackageRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.version_requirement == other.version_requirement
            && self.resolver_strategy_for_direct == other.resolver_strategy_for_direct
            && self.resolver_strategy_for_transitives == other.resolver_strategy_for_transitives
            && self.parent == other.parent
            && self.is_cli_tool == other.is_cli_tool
            && self.transitive_prereleases == other.transitive_prereleases
            && self.settings.framework_restrictions == other.settings.framework_restrictions
    }
}

impl Eq for PackageRequirement {}

impl Hash for PackageRequirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version_requirement.hash(state);
    }
}

impl PartialOrd for PackageRequirement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageRequirement {
    fn cmp(&self, other: &Self) -> Ordering {
        PackageRequirement::compare(self, other, None, 0, 0)
    }
}

impl Display for PackageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version_requirement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, vr: VersionRequirement) -> PackageRequirement {
        PackageRequirement::root(name, vr, Vec::new())
    }

    #[test]
    fn global_overrides_come_first() {
        let pinned = req("b", VersionRequirement::override_all(SemVer::one()));
        let open = req("a", VersionRequirement::all_releases());
        assert_eq!(
            PackageRequirement::compare(&pinned, &open, None, 0, 0),
            Ordering::Less
        );
    }

    #[test]
    fn boost_pulls_requirements_forward() {
        let a = req("a", VersionRequirement::all_releases());
        let b = req("b", VersionRequirement::all_releases());
        assert_eq!(PackageRequirement::compare(&a, &b, None, 0, 0), Ordering::Less);
        assert_eq!(PackageRequirement::compare(&a, &b, None, 0, -3), Ordering::Greater);
    }

    #[test]
    fn filter_outranks_name_order() {
        let a = req("a", VersionRequirement::all_releases());
        let b = req("b", VersionRequirement::all_releases());
        let filter = PackageFilter::Exact(PackageName::new("b"));
        assert_eq!(
            PackageRequirement::compare(&a, &b, Some(&filter), 0, 0),
            Ordering::Greater
        );
    }

    #[test]
    fn wildcard_filter_matches_case_insensitively() {
        let filter = PackageFilter::Wildcard("Newtonsoft.*".into());
        assert!(filter.matches(&PackageName::new("newtonsoft.json")));
        assert!(!filter.matches(&PackageName::new("nlog")));
    }
}
