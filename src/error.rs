// SPDX-License-Identifier: MPL-2.0

//! Handling resolver errors.

use std::time::Duration;

use thiserror::Error;

use crate::package::PackageName;
use crate::version::SemVer;

/// An error reported by a package feed, as surfaced by the injected
/// oracles. Kept cheap to clone because memoized requests hand the same
/// failure to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SourceError {
    /// Human-readable description of the failure.
    pub message: String,
    /// The feed that failed, when known.
    pub source_url: Option<String>,
}

impl SourceError {
    /// An error without feed attribution.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_url: None,
        }
    }

    /// An error attributed to a feed.
    pub fn from_feed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_url: Some(url.into()),
        }
    }
}

/// Errors that may occur while resolving dependencies.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// The search ended in a conflict and the caller asked for the
    /// resolved model anyway. Carries the rendered conflict report
    /// together with the non-fatal errors accumulated during search.
    #[error("{0}")]
    NoSolution(String),

    /// A blocking wait on an oracle request ran out of time.
    #[error(
        "request for {package} did not finish within {timeout:?}; \
         sources: {}", .sources.join(", ")
    )]
    Timeout {
        /// The requested package.
        package: PackageName,
        /// The feeds the request was sent to.
        sources: Vec<String>,
        /// The configured budget for blocking waits.
        timeout: Duration,
    },

    /// A wait on a request that already timed out once timed out again.
    #[error("request for {package} timed out before, not waiting again")]
    TimeoutAgain {
        /// The requested package.
        package: PackageName,
    },

    /// A feed failed while a candidate version was being explored.
    /// The candidate is rejected and the error reported as a warning.
    #[error("exploring {package} {version} failed: {source}")]
    Explore {
        /// The package being explored.
        package: PackageName,
        /// The candidate version.
        version: SemVer,
        /// The underlying feed failure.
        #[source]
        source: SourceError,
    },

    /// Accepting a candidate did not change the open requirement set.
    /// This is a bug in the resolver, not a user-recoverable condition.
    #[error(
        "the resolver made no progress on {package}: the new open requirements \
         equal the current ones"
    )]
    LoopDetected {
        /// The requirement being satisfied when progress stopped.
        package: PackageName,
    },

    /// A feed failure outside candidate exploration.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The surrounding cancellation token fired.
    #[error("the resolver run was cancelled")]
    Cancelled,
}
