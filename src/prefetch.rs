// SPDX-License-Identifier: MPL-2.0

//! Shared request memoization and the speculative prefetch pipeline.
//!
//! Every oracle call goes through a concurrent map keyed by
//! `(sources, package[, version])`, so the first submitter creates the
//! pooled request and everyone else observes the same handle. Without
//! this the prefetcher and the driver would race the same remote call
//! at different priorities.

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::{DependencySet, PackageDetails};
use crate::package::{GroupName, PackageName, PackageSource};
use crate::provider::{PackageProvider, VersionListing};
use crate::queue::{ResolverRequestQueue, WorkHandle, WorkPriority};
use crate::version::SemVer;

type VersionsKey = (Vec<PackageSource>, PackageName);
type DetailsKey = (Vec<PackageSource>, PackageName, SemVer);

/// Closure capturing what is known about available versions at failure
/// time; consulted by conflict reports without touching the driver.
pub type VersionLister = Arc<dyn Fn(&PackageName) -> Option<Vec<SemVer>> + Send + Sync>;

/// Memoized access to the injected oracles through the request pool.
#[derive(Clone)]
pub(crate) struct RequestMemo {
    queue: Arc<ResolverRequestQueue>,
    provider: Arc<dyn PackageProvider>,
    group: GroupName,
    versions: Arc<DashMap<VersionsKey, WorkHandle<VersionListing>>>,
    details: Arc<DashMap<DetailsKey, WorkHandle<PackageDetails>>>,
}

impl RequestMemo {
    pub(crate) fn new(
        queue: Arc<ResolverRequestQueue>,
        provider: Arc<dyn PackageProvider>,
        group: GroupName,
    ) -> Self {
        Self {
            queue,
            provider,
            group,
            versions: Arc::new(DashMap::new()),
            details: Arc::new(DashMap::new()),
        }
    }

    pub(crate) fn provider(&self) -> &Arc<dyn PackageProvider> {
        &self.provider
    }

    pub(crate) fn group(&self) -> &GroupName {
        &self.group
    }

    /// The pooled list-versions request for a package, created at the
    /// given priority if nobody asked before.
    pub(crate) fn list_versions(
        &self,
        sources: &[PackageSource],
        package: &PackageName,
        priority: WorkPriority,
    ) -> WorkHandle<VersionListing> {
        let key = (sources.to_vec(), package.clone());
        if let Some(handle) = self.versions.get(&key) {
            return handle.clone();
        }
        let provider = Arc::clone(&self.provider);
        let group = self.group.clone();
        let request_sources = sources.to_vec();
        let package = package.clone();
        self.versions
            .entry(key)
            .or_insert_with(|| {
                self.queue.add_work(priority, urls_of(sources), move |_token| {
                    provider.get_versions(request_sources, group, package)
                })
            })
            .clone()
    }

    /// The pooled get-details request for a package version.
    pub(crate) fn package_details(
        &self,
        sources: &[PackageSource],
        package: &PackageName,
        version: &SemVer,
        priority: WorkPriority,
    ) -> WorkHandle<PackageDetails> {
        let key = (sources.to_vec(), package.clone(), version.clone());
        if let Some(handle) = self.details.get(&key) {
            return handle.clone();
        }
        let provider = Arc::clone(&self.provider);
        let group = self.group.clone();
        let request_sources = sources.to_vec();
        let package = package.clone();
        let version = version.clone();
        self.details
            .entry(key)
            .or_insert_with(|| {
                self.queue.add_work(priority, urls_of(sources), move |_token| {
                    provider.get_package_details(request_sources, group, package, version)
                })
            })
            .clone()
    }

    /// Warm the caches for the dependencies of a freshly explored
    /// package: versions first, then details for the two representative
    /// versions (loosest and strictest match) and a handful more.
    pub(crate) fn prefetch(&self, sources: &[PackageSource], dependencies: &DependencySet) {
        for (name, requirement, _) in dependencies {
            let handle = self.list_versions(sources, name, WorkPriority::BackgroundWork);
            handle.try_reprioritize(true, WorkPriority::LikelyRequired);

            let memo = self.clone();
            let sources = sources.to_vec();
            let name = name.clone();
            let requirement = requirement.clone();
            tokio::spawn(async move {
                let Ok(listing) = handle.wait().await else {
                    return;
                };
                let mut versions: Vec<SemVer> = listing.into_iter().map(|(v, _)| v).collect();
                versions.sort_unstable_by(|a, b| b.cmp(a));

                let loose = versions.iter().find(|v| requirement.is_in_range(v, true));
                let strict = versions.iter().find(|v| requirement.is_in_range(v, false));
                let mut representatives: Vec<&SemVer> = Vec::new();
                for version in [loose, strict].into_iter().flatten() {
                    if !representatives.contains(&version) {
                        representatives.push(version);
                    }
                }
                for version in &representatives {
                    memo.package_details(&sources, &name, version, WorkPriority::LikelyRequired);
                }
                for version in versions
                    .iter()
                    .filter(|v| requirement.is_in_range(v, true))
                    .filter(|v| !representatives.contains(v))
                    .take(10)
                {
                    memo.package_details(&sources, &name, version, WorkPriority::MightBeRequired);
                }
            });
        }
    }

    /// A snapshot reader over completed listings, safe to hold inside a
    /// conflict report after the resolver has shut down.
    pub(crate) fn version_lister(&self) -> VersionLister {
        let versions = Arc::clone(&self.versions);
        Arc::new(move |package: &PackageName| {
            versions.iter().find_map(|entry| {
                let (_, name) = entry.key();
                if name != package {
                    return None;
                }
                match entry.value().peek() {
                    Some(Ok(listing)) => {
                        let mut found: Vec<SemVer> =
                            listing.into_iter().map(|(v, _)| v).collect();
                        found.sort_unstable_by(|a, b| b.cmp(a));
                        Some(found)
                    }
                    _ => None,
                }
            })
        })
    }
}

fn urls_of(sources: &[PackageSource]) -> Vec<String> {
    sources.iter().map(|s| s.url().to_string()).collect()
}
