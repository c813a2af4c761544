// SPDX-License-Identifier: MPL-2.0

//! NuGet-style package dependency resolution.
//!
//! Resolving consists in finding, for a set of root package
//! requirements, one concrete version per transitively reachable
//! package such that every requirement along the way is satisfied; and
//! when that is not possible, explaining the conflict as clearly as
//! possible instead of just failing.
//!
//! The algorithm is a backtracking search over the version lattice.
//! Requirements are picked by a composite priority (pinned overrides
//! first, shallow requirements before deep ones, historically
//! conflicting names boosted to the front), candidate versions are
//! ordered by the configured [ResolverStrategy], and known dead ends
//! are memoized so the search never explores the same conflict twice.
//! Framework restrictions filter the dependency lists of explored
//! packages, prerelease admission widens in well-defined fallback
//! steps, and a second "relaxed" pass retries the whole search when
//! only prerelease admission stood in the way.
//!
//! # Oracles
//!
//! The resolver performs no I/O itself. Everything it learns about the
//! outside world comes from a [PackageProvider]: a version listing per
//! package, an optional preferred-version prefix, and an authoritative
//! per-version record ([PackageDetails]). Provider calls are executed
//! on a bounded worker pool fed by a priority queue, so the search can
//! prefetch listings and details it will probably need while the
//! driver is busy elsewhere. See [WorkPriority] and the
//! `PAKET_RESOLVER_WORKERS` / `PAKET_RESOLVER_TASK_TIMEOUT`
//! environment variables.
//!
//! # Basic example
//!
//! Let's say our project needs `app.core` and `json`, and `app.core`
//! itself depends on `json` strictly below 2.0:
//!
//! ```
//! # use std::sync::Arc;
//! # use paket_resolver::{
//! #     resolve, OfflinePackageProvider, PackageName, PackageRequirement,
//! #     ResolverConfig, SemVer, VersionRequirement,
//! # };
//! let mut provider = OfflinePackageProvider::new();
//! provider.add_package(
//!     "app.core",
//!     SemVer::one(),
//!     [("json", VersionRequirement::less_than(SemVer::two()))],
//! );
//! provider.add_package("json", SemVer::new(1, 9, 0), Vec::<(&str, _)>::new());
//! provider.add_package("json", SemVer::two(), Vec::<(&str, _)>::new());
//!
//! let roots = [
//!     PackageRequirement::root("app.core", VersionRequirement::all_releases(), Vec::new()),
//!     PackageRequirement::root("json", VersionRequirement::all_releases(), Vec::new()),
//! ];
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let result = runtime
//!     .block_on(resolve(Arc::new(provider), ResolverConfig::default(), roots))
//!     .unwrap();
//! let model = result.ok_or_fail().unwrap();
//! assert_eq!(model[&PackageName::new("json")].version, SemVer::new(1, 9, 0));
//! ```
//!
//! # Conflict reporting
//!
//! When no assignment exists, [resolve] returns a
//! [Resolution::Conflict] carrying the failing step, the competing
//! requirements and a snapshot of the versions known at failure time.
//! [Resolution::get_error_text] renders it for users, enumerating the
//! packages resolved so far and the requirements that could not be
//! reconciled.

#![warn(missing_docs)]

mod cache;
mod conflicts;
mod constraints;
mod error;
mod filter;
mod frameworks;
mod package;
mod prefetch;
mod provider;
mod queue;
mod requirement;
mod resolution;
mod resolver;
mod selector;
mod type_aliases;
mod version;

pub use cache::{Dependency, DependencySet, PackageDetails, ResolvedPackage, VersionCache};
pub use constraints::{Bound, PreReleaseStatus, VersionRange, VersionRequirement};
pub use error::{ResolverError, SourceError};
pub use filter::filter_by_restrictions;
pub use frameworks::{
    filter_restrictions, Framework, FrameworkRestriction, FrameworkRestrictions, InstallSettings,
};
pub use internal::step::ResolverStep;
pub use package::{GroupName, PackageName, PackageSource};
pub use prefetch::VersionLister;
pub use provider::{OfflinePackageProvider, PackageProvider, VersionListing};
pub use queue::{
    CancellationToken, QueueConfig, ResolverRequestQueue, WorkError, WorkHandle, WorkPriority,
};
pub use requirement::{
    combine_strategies, PackageFilter, PackageRequirement, RequirementSource, ResolverStrategy,
    UpdateMode,
};
pub use resolution::{cleanup_names, ConflictInfo, Resolution, ResolverResult};
pub use resolver::{resolve, ResolverConfig};
pub use type_aliases::{Map, PackageResolution, Set};
pub use version::{SemVer, VersionParseError};

mod internal;
