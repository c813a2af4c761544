// SPDX-License-Identifier: MPL-2.0

//! Semantic versions as the registry reports them,
//! including an optional prerelease tag.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Type for semantic versions: major.minor.patch with an optional prerelease tag.
///
/// Versions with a prerelease tag sort directly below the release
/// carrying the same numeric triple, so `1.0.0-beta < 1.0.0`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SemVer {
    major: u32,
    minor: u32,
    patch: u32,
    prerelease: Option<String>,
}

// Constructors
impl SemVer {
    /// Create a release version with "major", "minor" and "patch" values.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Create a prerelease version, e.g. `SemVer::prerelease(1, 0, 0, "beta.2")`.
    pub fn prerelease(major: u32, minor: u32, patch: u32, tag: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Some(tag.into()),
        }
    }

    /// Version 0.0.0.
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Version 1.0.0.
    pub fn one() -> Self {
        Self::new(1, 0, 0)
    }

    /// Version 2.0.0.
    pub fn two() -> Self {
        Self::new(2, 0, 0)
    }
}

impl SemVer {
    /// The prerelease tag, if any.
    pub fn prerelease_tag(&self) -> Option<&str> {
        self.prerelease.as_deref()
    }

    /// The leading identifier of the prerelease tag ("beta" for "beta.2").
    pub fn prerelease_label(&self) -> Option<&str> {
        self.prerelease
            .as_deref()
            .map(|tag| tag.split('.').next().unwrap_or(tag))
    }

    /// Whether this version carries a prerelease tag.
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Whether both versions carry the same numeric triple,
    /// regardless of prerelease tags.
    pub fn same_release(&self, other: &SemVer) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }
}

// Convert a tuple (major, minor, patch) into a release version.
impl From<(u32, u32, u32)> for SemVer {
    fn from(tuple: (u32, u32, u32)) -> Self {
        let (major, minor, patch) = tuple;
        Self::new(major, minor, patch)
    }
}

impl From<u32> for SemVer {
    fn from(major: u32) -> Self {
        Self::new(major, 0, 0)
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => cmp_prerelease(a, b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dot-separated identifiers, numeric ones compared numerically,
/// the rest lexically; fewer identifiers sort first.
fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(n), Ok(m)) => n.cmp(&m),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(tag) = &self.prerelease {
            write!(f, "-{tag}")?;
        }
        Ok(())
    }
}

/// Error creating [SemVer] from an invalid string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{full_version} is not a valid semantic version")]
pub struct VersionParseError {
    /// The invalid version.
    pub full_version: String,
}

impl FromStr for SemVer {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            full_version: s.to_string(),
        };
        let (triple, prerelease) = match s.split_once('-') {
            Some((t, tag)) if !tag.is_empty() => (t, Some(tag.to_string())),
            Some(_) => return Err(err()),
            None => (s, None),
        };
        let mut parts = triple.split('.');
        let mut next = || -> Result<u32, VersionParseError> {
            parts.next().unwrap_or("0").parse().map_err(|_| err())
        };
        let (major, minor, patch) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
        })
    }
}
