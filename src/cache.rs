// SPDX-License-Identifier: MPL-2.0

//! Records produced while exploring packages, and the cache that keeps
//! them across the whole search.

use std::collections::BTreeSet;

use crate::constraints::VersionRequirement;
use crate::frameworks::{FrameworkRestrictions, InstallSettings};
use crate::package::{PackageName, PackageSource};
use crate::type_aliases::Map;
use crate::version::SemVer;

/// One declared dependency: name, admissible versions and the
/// frameworks the edge applies to.
pub type Dependency = (PackageName, VersionRequirement, FrameworkRestrictions);

/// The dependency list of a package, deduplicated and ordered.
pub type DependencySet = BTreeSet<Dependency>;

/// A candidate version together with the feeds that can deliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCache {
    /// The candidate version.
    pub version: SemVer,
    /// Feeds offering the version, most preferred first.
    pub sources: Vec<PackageSource>,
    /// `true` when no feed reported the version and it was constructed
    /// to honour a pinned requirement.
    pub assumed_version: bool,
}

impl VersionCache {
    /// A version as reported by feeds. Local feeds answer fastest and
    /// the public feed is the slowest fallback, so sources are kept in
    /// that order, deduplicated.
    pub fn reported(version: SemVer, sources: Vec<PackageSource>) -> Self {
        let mut cache = Self {
            version,
            sources,
            assumed_version: false,
        };
        cache.dedup_sources();
        cache
            .sources
            .sort_by_key(|s| (!s.is_local_feed(), s.is_nuget_org()));
        cache
    }

    /// A synthesized entry for a pin no feed reported. The caller has
    /// already ordered the sources (parent feed first); they are only
    /// deduplicated here.
    pub fn assumed(version: SemVer, sources: Vec<PackageSource>) -> Self {
        let mut cache = Self {
            version,
            sources,
            assumed_version: true,
        };
        cache.dedup_sources();
        cache
    }

    fn dedup_sources(&mut self) {
        let mut seen = Vec::new();
        self.sources.retain(|s| {
            if seen.contains(s) {
                false
            } else {
                seen.push(s.clone());
                true
            }
        });
    }
}

/// The authoritative per-version record reported by a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDetails {
    /// The name with the feed's canonical casing.
    pub name: PackageName,
    /// The feed that answered.
    pub source: PackageSource,
    /// Where the package content can be downloaded.
    pub download_link: String,
    /// The license url, when the feed reports one.
    pub license_url: Option<String>,
    /// Whether the feed hides the version from listings.
    pub unlisted: bool,
    /// The dependencies declared by this version.
    pub direct_dependencies: DependencySet,
}

/// A package the search has committed to (for the current path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// The package name, canonical casing from the feed.
    pub name: PackageName,
    /// The chosen version.
    pub version: SemVer,
    /// The dependencies after framework-restriction filtering.
    pub dependencies: DependencySet,
    /// Whether the feed hides the version from listings.
    pub unlisted: bool,
    /// Whether the package is needed at runtime.
    pub is_runtime_dependency: bool,
    /// Whether the package is a CLI tool.
    pub is_cli_tool: bool,
    /// Effective install settings, including framework restrictions.
    pub settings: InstallSettings,
    /// The feed the package was retrieved from.
    pub source: PackageSource,
}

/// Memoizes `(package, version) -> ResolvedPackage` across the search,
/// so backtracking never re-fetches details it has already seen.
#[derive(Debug, Default)]
pub struct ExploredPackageCache {
    explored: Map<(PackageName, SemVer), ResolvedPackage>,
}

impl ExploredPackageCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record for a package and version pair, if already explored.
    pub fn get(&self, name: &PackageName, version: &SemVer) -> Option<&ResolvedPackage> {
        self.explored.get(&(name.clone(), version.clone()))
    }

    /// Store (or replace) the record for a package and version pair.
    pub fn insert(&mut self, package: ResolvedPackage) {
        self.explored
            .insert((package.name.clone(), package.version.clone()), package);
    }

    /// Number of unique pairs of package and version in cache.
    pub fn len(&self) -> usize {
        self.explored.len()
    }

    /// Whether nothing has been explored yet.
    pub fn is_empty(&self) -> bool {
        self.explored.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_sort_local_first_and_nuget_org_last() {
        let cache = VersionCache::reported(
            SemVer::one(),
            vec![
                PackageSource::remote("https://api.nuget.org/v3/index.json"),
                PackageSource::remote("https://feed.example.com/v3/index.json"),
                PackageSource::local("/opt/feed"),
                PackageSource::remote("https://feed.example.com/v3/index.json"),
            ],
        );
        assert_eq!(cache.sources.len(), 3);
        assert!(cache.sources[0].is_local_feed());
        assert!(cache.sources[2].is_nuget_org());
    }

    #[test]
    fn cache_is_keyed_case_insensitively() {
        let mut cache = ExploredPackageCache::new();
        cache.insert(ResolvedPackage {
            name: PackageName::new("FAKE"),
            version: SemVer::one(),
            dependencies: DependencySet::new(),
            unlisted: false,
            is_runtime_dependency: false,
            is_cli_tool: false,
            settings: InstallSettings::default(),
            source: PackageSource::remote("https://api.nuget.org/v3/index.json"),
        });
        assert!(cache.get(&PackageName::new("fake"), &SemVer::one()).is_some());
    }
}
