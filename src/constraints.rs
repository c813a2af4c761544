// SPDX-License-Identifier: MPL-2.0

//! Version ranges and requirements as declared by dependency files.
//!
//! This is a thin facade over range arithmetic: the resolver only needs
//! membership tests, a subsumption check and the prerelease admission
//! policy, so the representation stays close to what declarations say
//! instead of a normalized interval algebra.

use std::fmt::{self, Display};

use crate::version::SemVer;

/// Whether an interval border belongs to the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Bound {
    /// The border itself is outside the range.
    Excluding,
    /// The border itself is part of the range.
    Including,
}

/// A predicate over versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VersionRange {
    /// `>= v`
    Minimum(SemVer),
    /// `> v`
    GreaterThan(SemVer),
    /// `<= v`
    Maximum(SemVer),
    /// `< v`
    LessThan(SemVer),
    /// `= v`
    Specific(SemVer),
    /// `== v`: a global override that silences every other
    /// requirement on the same package.
    OverrideAll(SemVer),
    /// A two-sided interval.
    Range(Bound, SemVer, SemVer, Bound),
}

impl VersionRange {
    /// Whether the range silences all other requirements on the package.
    pub fn is_global_override(&self) -> bool {
        matches!(self, VersionRange::OverrideAll(_))
    }

    /// Whether the range pins a single version.
    pub fn is_specific(&self) -> bool {
        matches!(self, VersionRange::Specific(_) | VersionRange::OverrideAll(_))
    }

    /// The pinned version for [Specific](VersionRange::Specific) and
    /// [OverrideAll](VersionRange::OverrideAll) ranges.
    pub fn pinned_version(&self) -> Option<&SemVer> {
        match self {
            VersionRange::Specific(v) | VersionRange::OverrideAll(v) => Some(v),
            _ => None,
        }
    }

    /// Pure interval membership, ignoring prerelease policies.
    /// Prereleases order directly below their release triple,
    /// so `>= 1.0.0` already excludes `1.0.0-beta` by ordering.
    pub fn matches(&self, version: &SemVer) -> bool {
        match self {
            VersionRange::Minimum(m) => m <= version,
            VersionRange::GreaterThan(m) => m < version,
            VersionRange::Maximum(m) => version <= m,
            VersionRange::LessThan(m) => version < m,
            VersionRange::Specific(v) | VersionRange::OverrideAll(v) => v == version,
            VersionRange::Range(from_bound, from, to, to_bound) => {
                let lower = match from_bound {
                    Bound::Including => from <= version,
                    Bound::Excluding => from < version,
                };
                let upper = match to_bound {
                    Bound::Including => version <= to,
                    Bound::Excluding => version < to,
                };
                lower && upper
            }
        }
    }

    /// The interval borders mentioned by the declaration. A prerelease
    /// border admits prereleases of the same triple even under a `No`
    /// prerelease policy (`>= 1.0.0-beta` must accept `1.0.0-beta`).
    fn anchors(&self) -> [Option<&SemVer>; 2] {
        match self {
            VersionRange::Minimum(v)
            | VersionRange::GreaterThan(v)
            | VersionRange::Maximum(v)
            | VersionRange::LessThan(v)
            | VersionRange::Specific(v)
            | VersionRange::OverrideAll(v) => [Some(v), None],
            VersionRange::Range(_, from, to, _) => [Some(from), Some(to)],
        }
    }

    /// Conservative subsumption: `true` means every version in `self`
    /// also lies in `other`. `false` is allowed for shapes the check
    /// does not reason about.
    pub fn is_included_in(&self, other: &VersionRange) -> bool {
        use VersionRange::*;
        if self == other {
            return true;
        }
        match (self, other) {
            (Specific(v) | OverrideAll(v), _) => other.matches(v),
            (Minimum(a), Minimum(b)) => b <= a,
            (Minimum(a), GreaterThan(b)) => b < a,
            (GreaterThan(a), Minimum(b) | GreaterThan(b)) => b <= a,
            (Maximum(a), Maximum(b)) => a <= b,
            (Maximum(a), LessThan(b)) => a < b,
            (LessThan(a), LessThan(b) | Maximum(b)) => a <= b,
            (Range(fb, from, to, tb), _) => {
                let lower_ok = match fb {
                    Bound::Including => other_contains_lower(other, from, true),
                    Bound::Excluding => other_contains_lower(other, from, false),
                };
                let upper_ok = match tb {
                    Bound::Including => other_contains_upper(other, to, true),
                    Bound::Excluding => other_contains_upper(other, to, false),
                };
                lower_ok && upper_ok
            }
            _ => false,
        }
    }
}

fn other_contains_lower(other: &VersionRange, from: &SemVer, inclusive: bool) -> bool {
    use VersionRange::*;
    match other {
        Minimum(b) => b <= from,
        GreaterThan(b) => {
            if inclusive {
                b < from
            } else {
                b <= from
            }
        }
        Maximum(_) | LessThan(_) => true,
        Range(fb, b, _, _) => match fb {
            Bound::Including => b <= from,
            Bound::Excluding => {
                if inclusive {
                    b < from
                } else {
                    b <= from
                }
            }
        },
        _ => false,
    }
}

fn other_contains_upper(other: &VersionRange, to: &SemVer, inclusive: bool) -> bool {
    use VersionRange::*;
    match other {
        Maximum(b) => to <= b,
        LessThan(b) => {
            if inclusive {
                to < b
            } else {
                to <= b
            }
        }
        Minimum(_) | GreaterThan(_) => true,
        Range(_, _, b, tb) => match tb {
            Bound::Including => to <= b,
            Bound::Excluding => {
                if inclusive {
                    to < b
                } else {
                    to <= b
                }
            }
        },
        _ => false,
    }
}

impl Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Minimum(v) => write!(f, ">= {v}"),
            VersionRange::GreaterThan(v) => write!(f, "> {v}"),
            VersionRange::Maximum(v) => write!(f, "<= {v}"),
            VersionRange::LessThan(v) => write!(f, "< {v}"),
            VersionRange::Specific(v) => write!(f, "{v}"),
            VersionRange::OverrideAll(v) => write!(f, "== {v}"),
            VersionRange::Range(from_bound, from, to, to_bound) => {
                let lower = match from_bound {
                    Bound::Including => ">=",
                    Bound::Excluding => ">",
                };
                let upper = match to_bound {
                    Bound::Including => "<=",
                    Bound::Excluding => "<",
                };
                write!(f, "{lower} {from} {upper} {to}")
            }
        }
    }
}

/// Which prerelease versions a requirement admits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PreReleaseStatus {
    /// Only releases.
    No,
    /// Any prerelease.
    All,
    /// Prereleases whose leading identifier matches one of the labels.
    Concrete(Vec<String>),
}

/// A version range together with a prerelease admission policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionRequirement {
    /// The interval part of the requirement.
    pub range: VersionRange,
    /// The prerelease part of the requirement.
    pub prereleases: PreReleaseStatus,
}

// Constructors, mostly for tests and in-memory providers.
impl VersionRequirement {
    /// `>= 0.0.0`, releases only. The requirement every unconstrained
    /// dependency declaration carries.
    pub fn all_releases() -> Self {
        Self::new(VersionRange::Minimum(SemVer::zero()))
    }

    /// Wrap a range, admitting releases only.
    pub fn new(range: VersionRange) -> Self {
        Self {
            range,
            prereleases: PreReleaseStatus::No,
        }
    }

    /// `= v`
    pub fn exactly(version: impl Into<SemVer>) -> Self {
        Self::new(VersionRange::Specific(version.into()))
    }

    /// `== v`, the global override.
    pub fn override_all(version: impl Into<SemVer>) -> Self {
        Self::new(VersionRange::OverrideAll(version.into()))
    }

    /// `>= v`
    pub fn at_least(version: impl Into<SemVer>) -> Self {
        Self::new(VersionRange::Minimum(version.into()))
    }

    /// `> v`
    pub fn greater_than(version: impl Into<SemVer>) -> Self {
        Self::new(VersionRange::GreaterThan(version.into()))
    }

    /// `< v`
    pub fn less_than(version: impl Into<SemVer>) -> Self {
        Self::new(VersionRange::LessThan(version.into()))
    }

    /// `>= from < to`
    pub fn between(from: impl Into<SemVer>, to: impl Into<SemVer>) -> Self {
        Self::new(VersionRange::Range(
            Bound::Including,
            from.into(),
            to.into(),
            Bound::Excluding,
        ))
    }

    /// The same range under a different prerelease policy.
    pub fn including_prereleases(&self, status: PreReleaseStatus) -> Self {
        Self {
            range: self.range.clone(),
            prereleases: status,
        }
    }
}

impl VersionRequirement {
    /// Whether `version` satisfies the requirement.
    /// `ignore_prereleases` skips the prerelease policy check, so any
    /// prerelease inside the interval is admitted.
    pub fn is_in_range(&self, version: &SemVer, ignore_prereleases: bool) -> bool {
        if !self.range.matches(version) {
            return false;
        }
        if ignore_prereleases || !version.is_prerelease() {
            return true;
        }
        match &self.prereleases {
            PreReleaseStatus::All => true,
            PreReleaseStatus::Concrete(labels) => version
                .prerelease_label()
                .is_some_and(|label| labels.iter().any(|l| l == label)),
            PreReleaseStatus::No => self.anchored_prerelease(version),
        }
    }

    /// A requirement pinned to a prerelease (e.g. `>= 1.0.0-beta`) admits
    /// prereleases of that triple even when the policy says `No`.
    fn anchored_prerelease(&self, version: &SemVer) -> bool {
        self.range
            .anchors()
            .iter()
            .flatten()
            .any(|anchor| anchor.is_prerelease() && anchor.same_release(version))
    }
}

impl Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.range)?;
        match &self.prereleases {
            PreReleaseStatus::No => Ok(()),
            PreReleaseStatus::All => write!(f, " prerelease"),
            PreReleaseStatus::Concrete(labels) => write!(f, " ({})", labels.join(", ")),
        }
    }
}
