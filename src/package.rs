// SPDX-License-Identifier: MPL-2.0

//! Identifiers for packages, dependency groups and package sources.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

/// A package identifier.
///
/// Names compare case-insensitively, but the casing used at construction
/// is preserved for display. The casing bound to a resolution wins over
/// the casing used by dependency declarations (see `cleanup_names`).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageName {
    name: String,
    compare_string: String,
}

impl PackageName {
    /// Wrap a raw package name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let compare_string = name.to_lowercase();
        Self {
            name,
            compare_string,
        }
    }

    /// The name as the caller spelled it.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The lowercased form used for comparisons.
    pub fn compare_string(&self) -> &str {
        &self.compare_string
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.compare_string == other.compare_string
    }
}

impl Eq for PackageName {}

impl PartialOrd for PackageName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_string.cmp(&other.compare_string)
    }
}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.compare_string.hash(state);
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for PackageName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PackageName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A dependency group. Every resolver run works on a single group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupName(String);

impl GroupName {
    /// The default group.
    pub fn main() -> Self {
        Self("Main".to_string())
    }

    /// Wrap a raw group name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A feed packages can be retrieved from, either remote or a local directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageSource {
    url: String,
    is_local_feed: bool,
}

impl PackageSource {
    /// A remote feed at the given url.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_local_feed: false,
        }
    }

    /// A local directory feed.
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            url: path.into(),
            is_local_feed: true,
        }
    }

    /// The feed url (or directory path for local feeds).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether this source is a local directory feed.
    pub fn is_local_feed(&self) -> bool {
        self.is_local_feed
    }

    /// Whether this source points at the default public feed.
    pub fn is_nuget_org(&self) -> bool {
        self.url.to_lowercase().contains("nuget.org")
    }
}

impl Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_compare_case_insensitively() {
        let a = PackageName::new("Newtonsoft.Json");
        let b = PackageName::new("newtonsoft.json");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Newtonsoft.Json");
    }
}
