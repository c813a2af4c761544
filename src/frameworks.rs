// SPDX-License-Identifier: MPL-2.0

//! Target-framework restrictions.
//!
//! The restriction algebra proper (framework identifier parsing,
//! platform inference) lives outside this crate. The resolver only ever
//! needs the boolean lattice over represented framework sets, which is
//! what this facade provides.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

/// An opaque target-framework identifier, e.g. `net45` or `netstandard2.0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Framework(String);

impl Framework {
    /// Wrap a framework identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Framework {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Framework {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// A restriction on the frameworks a dependency applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameworkRestriction {
    /// The dependency applies everywhere.
    NoRestriction,
    /// The dependency applies exactly to the given frameworks.
    Frameworks(BTreeSet<Framework>),
}

impl FrameworkRestriction {
    /// A restriction to a list of frameworks.
    pub fn frameworks<I, F>(frameworks: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Framework>,
    {
        Self::Frameworks(frameworks.into_iter().map(Into::into).collect())
    }

    /// The frameworks this restriction represents,
    /// or `None` for "all of them".
    pub fn represented_frameworks(&self) -> Option<&BTreeSet<Framework>> {
        match self {
            FrameworkRestriction::NoRestriction => None,
            FrameworkRestriction::Frameworks(set) => Some(set),
        }
    }

    /// Whether the represented framework sets overlap.
    pub fn intersects(&self, other: &FrameworkRestriction) -> bool {
        match (self.represented_frameworks(), other.represented_frameworks()) {
            (None, None) => true,
            (None, Some(set)) | (Some(set), None) => !set.is_empty(),
            (Some(a), Some(b)) => a.intersection(b).next().is_some(),
        }
    }

    /// Meet of the lattice: restrict to frameworks represented by both.
    pub fn and(&self, other: &FrameworkRestriction) -> FrameworkRestriction {
        match (self.represented_frameworks(), other.represented_frameworks()) {
            (None, None) => FrameworkRestriction::NoRestriction,
            (None, Some(set)) | (Some(set), None) => {
                FrameworkRestriction::Frameworks(set.clone())
            }
            (Some(a), Some(b)) => {
                FrameworkRestriction::Frameworks(a.intersection(b).cloned().collect())
            }
        }
    }

    /// Join of the lattice: frameworks represented by either side.
    pub fn or(&self, other: &FrameworkRestriction) -> FrameworkRestriction {
        match (self.represented_frameworks(), other.represented_frameworks()) {
            (None, _) | (_, None) => FrameworkRestriction::NoRestriction,
            (Some(a), Some(b)) => {
                FrameworkRestriction::Frameworks(a.union(b).cloned().collect())
            }
        }
    }
}

impl Display for FrameworkRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameworkRestriction::NoRestriction => f.write_str("no restriction"),
            FrameworkRestriction::Frameworks(set) => {
                let mut first = true;
                for fw in set {
                    if !first {
                        f.write_str(" || ")?;
                    }
                    write!(f, "{fw}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// A restriction as it appears in dependency settings: either stated
/// explicitly or left for the project file to determine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameworkRestrictions {
    /// The dependency declaration states a restriction.
    Explicit(FrameworkRestriction),
    /// No statement; frameworks are detected from the project.
    AutoDetect,
}

impl FrameworkRestrictions {
    /// The stated restriction, treating auto-detection as unrestricted.
    pub fn explicit_restriction(&self) -> FrameworkRestriction {
        match self {
            FrameworkRestrictions::Explicit(r) => r.clone(),
            FrameworkRestrictions::AutoDetect => FrameworkRestriction::NoRestriction,
        }
    }

    /// Whether this is effectively "no restriction".
    pub fn is_unrestricted(&self) -> bool {
        self.explicit_restriction() == FrameworkRestriction::NoRestriction
    }
}

impl Default for FrameworkRestrictions {
    fn default() -> Self {
        FrameworkRestrictions::Explicit(FrameworkRestriction::NoRestriction)
    }
}

/// Combine two restriction statements; auto-detection defers to the
/// other side, explicit statements are intersected.
pub fn filter_restrictions(
    left: &FrameworkRestrictions,
    right: &FrameworkRestrictions,
) -> FrameworkRestrictions {
    match (left, right) {
        (FrameworkRestrictions::AutoDetect, FrameworkRestrictions::AutoDetect) => {
            FrameworkRestrictions::AutoDetect
        }
        (FrameworkRestrictions::AutoDetect, r) | (r, FrameworkRestrictions::AutoDetect) => {
            r.clone()
        }
        (FrameworkRestrictions::Explicit(a), FrameworkRestrictions::Explicit(b)) => {
            FrameworkRestrictions::Explicit(a.and(b))
        }
    }
}

/// Settings attached to a requirement or a resolved package.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstallSettings {
    /// The effective framework restrictions.
    pub framework_restrictions: FrameworkRestrictions,
}

impl InstallSettings {
    /// Settings restricting to an explicit restriction.
    pub fn with_restriction(restriction: FrameworkRestriction) -> Self {
        Self {
            framework_restrictions: FrameworkRestrictions::Explicit(restriction),
        }
    }
}
