// SPDX-License-Identifier: MPL-2.0

//! Publicly exported type aliases.

use indexmap::IndexMap;

use crate::cache::ResolvedPackage;
use crate::package::PackageName;

/// Map implementation used by the library.
pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

/// Set implementation used by the library.
pub type Set<V> = rustc_hash::FxHashSet<V>;

/// Concrete packages picked by the library during [resolve](crate::resolver::resolve),
/// in the order in which they were accepted by the search.
pub type PackageResolution = IndexMap<PackageName, ResolvedPackage>;
