// SPDX-License-Identifier: MPL-2.0

//! The oracle interface the resolver consumes, plus an in-memory
//! implementation used by tests and documentation examples.

use std::collections::BTreeMap;

use futures::future::BoxFuture;

use crate::cache::{Dependency, DependencySet, PackageDetails};
use crate::constraints::VersionRequirement;
use crate::error::SourceError;
use crate::frameworks::FrameworkRestrictions;
use crate::package::{GroupName, PackageName, PackageSource};
use crate::requirement::ResolverStrategy;
use crate::type_aliases::Map;
use crate::version::SemVer;

/// Versions of one package, each with the feeds that offer it.
pub type VersionListing = Vec<(SemVer, Vec<PackageSource>)>;

/// Trait that allows the algorithm to retrieve available versions and
/// per-version package details. An implementor is injected into
/// [resolve](crate::resolver::resolve); the resolver performs no I/O of
/// its own and calls these oracles from pooled worker tasks.
pub trait PackageProvider: Send + Sync + 'static {
    /// List the versions of a package across the given feeds.
    fn get_versions(
        &self,
        sources: Vec<PackageSource>,
        group: GroupName,
        package: PackageName,
    ) -> BoxFuture<'static, Result<VersionListing, SourceError>>;

    /// A priority prefix (pinned, locked or last-known versions) that is
    /// prepended to the strategy-sorted listing. May be empty.
    fn get_preferred_versions(
        &self,
        strategy: ResolverStrategy,
        sources: &[PackageSource],
        group: &GroupName,
        package: &PackageName,
    ) -> VersionListing;

    /// The authoritative record for one package version.
    fn get_package_details(
        &self,
        sources: Vec<PackageSource>,
        group: GroupName,
        package: PackageName,
        version: SemVer,
    ) -> BoxFuture<'static, Result<PackageDetails, SourceError>>;
}

#[derive(Debug, Clone, Default)]
struct PackageEntry {
    dependencies: DependencySet,
    unlisted: bool,
    omitted_from_listing: bool,
}

/// A [PackageProvider] answering from memory.
///
/// Currently versions are reported in ascending order; the resolver
/// applies its own strategy ordering, so implementors need not sort.
#[derive(Debug, Clone)]
pub struct OfflinePackageProvider {
    source: PackageSource,
    packages: Map<PackageName, BTreeMap<SemVer, PackageEntry>>,
    preferred: Map<PackageName, Vec<SemVer>>,
    failing_details: Map<(PackageName, SemVer), SourceError>,
}

impl OfflinePackageProvider {
    /// An empty registry served from a synthetic feed.
    pub fn new() -> Self {
        Self {
            source: PackageSource::remote("https://api.nuget.org/v3/index.json"),
            packages: Map::default(),
            preferred: Map::default(),
            failing_details: Map::default(),
        }
    }

    /// The feed all answers claim to come from.
    pub fn source(&self) -> &PackageSource {
        &self.source
    }

    /// Register a package version and its dependencies. Registering the
    /// same pair again replaces the dependencies.
    pub fn add_package<N, I>(&mut self, name: N, version: impl Into<SemVer>, dependencies: I)
    where
        N: Into<PackageName>,
        I: IntoIterator<Item = (N, VersionRequirement)>,
    {
        let dependencies: DependencySet = dependencies
            .into_iter()
            .map(|(n, vr)| (n.into(), vr, FrameworkRestrictions::AutoDetect))
            .collect();
        self.add_package_with_restrictions(name, version, dependencies);
    }

    /// Register a package version with fully specified dependency
    /// entries, including framework restrictions.
    pub fn add_package_with_restrictions(
        &mut self,
        name: impl Into<PackageName>,
        version: impl Into<SemVer>,
        dependencies: impl IntoIterator<Item = Dependency>,
    ) {
        let entry = PackageEntry {
            dependencies: dependencies.into_iter().collect(),
            unlisted: false,
            omitted_from_listing: false,
        };
        self.packages
            .entry(name.into())
            .or_default()
            .insert(version.into(), entry);
    }

    /// Hide a registered version from listings without removing it.
    pub fn mark_unlisted(&mut self, name: impl Into<PackageName>, version: impl Into<SemVer>) {
        let name = name.into();
        let version = version.into();
        if let Some(entry) = self
            .packages
            .get_mut(&name)
            .and_then(|versions| versions.get_mut(&version))
        {
            entry.unlisted = true;
        }
    }

    /// Drop a registered version from listings entirely while keeping
    /// its details retrievable, like a feed whose search index lags.
    pub fn omit_from_listing(&mut self, name: impl Into<PackageName>, version: impl Into<SemVer>) {
        let name = name.into();
        let version = version.into();
        if let Some(entry) = self
            .packages
            .get_mut(&name)
            .and_then(|versions| versions.get_mut(&version))
        {
            entry.omitted_from_listing = true;
        }
    }

    /// Make details retrieval fail for one registered version.
    pub fn fail_details_of(
        &mut self,
        name: impl Into<PackageName>,
        version: impl Into<SemVer>,
        message: impl Into<String>,
    ) {
        self.failing_details.insert(
            (name.into(), version.into()),
            SourceError::from_feed(self.source.url(), message),
        );
    }

    /// Set the preferred-version prefix reported for a package.
    pub fn set_preferred(
        &mut self,
        name: impl Into<PackageName>,
        versions: impl IntoIterator<Item = SemVer>,
    ) {
        self.preferred
            .insert(name.into(), versions.into_iter().collect());
    }

    fn listing(&self, package: &PackageName) -> VersionListing {
        self.packages
            .get(package)
            .map(|versions| {
                versions
                    .iter()
                    .filter(|(_, entry)| !entry.omitted_from_listing)
                    .map(|(v, _)| (v.clone(), vec![self.source.clone()]))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for OfflinePackageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageProvider for OfflinePackageProvider {
    fn get_versions(
        &self,
        _sources: Vec<PackageSource>,
        _group: GroupName,
        package: PackageName,
    ) -> BoxFuture<'static, Result<VersionListing, SourceError>> {
        let listing = self.listing(&package);
        Box::pin(async move { Ok(listing) })
    }

    fn get_preferred_versions(
        &self,
        _strategy: ResolverStrategy,
        _sources: &[PackageSource],
        _group: &GroupName,
        package: &PackageName,
    ) -> VersionListing {
        self.preferred
            .get(package)
            .map(|versions| {
                versions
                    .iter()
                    .map(|v| (v.clone(), vec![self.source.clone()]))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_package_details(
        &self,
        _sources: Vec<PackageSource>,
        _group: GroupName,
        package: PackageName,
        version: SemVer,
    ) -> BoxFuture<'static, Result<PackageDetails, SourceError>> {
        let result = if let Some(err) = self.failing_details.get(&(package.clone(), version.clone()))
        {
            Err(err.clone())
        } else {
            match self
                .packages
                .get_key_value(&package)
                .and_then(|(canonical, versions)| {
                    versions.get(&version).map(|entry| (canonical, entry))
                }) {
                Some((canonical, entry)) => Ok(PackageDetails {
                    name: canonical.clone(),
                    source: self.source.clone(),
                    download_link: format!("{}/{}/{}", self.source.url(), package, version),
                    license_url: None,
                    unlisted: entry.unlisted,
                    direct_dependencies: entry.dependencies.clone(),
                }),
                None => Err(SourceError::from_feed(
                    self.source.url(),
                    format!("{package} {version} was not found"),
                )),
            }
        };
        Box::pin(async move { result })
    }
}
