// SPDX-License-Identifier: MPL-2.0

//! Candidate version selection: which versions to try for the chosen
//! requirement, and in which order.

use std::time::Duration;

use crate::cache::VersionCache;
use crate::constraints::{PreReleaseStatus, VersionRequirement};
use crate::error::ResolverError;
use crate::internal::step::ResolverStep;
use crate::package::PackageSource;
use crate::prefetch::RequestMemo;
use crate::queue::WorkPriority;
use crate::requirement::{
    combine_strategies, PackageRequirement, RequirementSource, ResolverStrategy,
};
use crate::version::SemVer;

/// The ordered candidates for one requirement.
#[derive(Debug, Clone)]
pub(crate) struct CandidateSelection {
    /// Versions to try, most preferred first.
    pub(crate) versions: Vec<VersionCache>,
    /// Whether the requirement is a global override, silencing every
    /// other requirement on the name.
    pub(crate) global_override: bool,
    /// Set when candidates only exist with prereleases admitted while
    /// the step is still strict: on failure the whole search should be
    /// retried in relaxed mode.
    pub(crate) try_relaxed: bool,
}

/// The strategy for the current requirement against the other open
/// requirements `all` on the same name.
pub(crate) fn resolver_strategy(
    global_direct: Option<ResolverStrategy>,
    global_transitive: Option<ResolverStrategy>,
    all: &[&PackageRequirement],
    current: &PackageRequirement,
) -> ResolverStrategy {
    if current.parent.is_root() && all.len() == 1 {
        combine_strategies(current.resolver_strategy_for_direct, global_direct)
            .unwrap_or(ResolverStrategy::Max)
    } else {
        let mut transitives: Vec<&&PackageRequirement> =
            all.iter().filter(|r| r.depth() > 0).collect();
        transitives.sort_by_key(|r| {
            (
                r.depth(),
                r.resolver_strategy_for_transitives != global_transitive,
                r.resolver_strategy_for_transitives != Some(ResolverStrategy::Max),
            )
        });
        let combined = transitives
            .iter()
            .map(|r| r.resolver_strategy_for_transitives)
            .fold(None, combine_strategies);
        combine_strategies(combined, global_transitive).unwrap_or(ResolverStrategy::Max)
    }
}

/// Compute the candidates for `current` in `step`, fetching the version
/// listing through the memoized request pool when the name has not been
/// filtered before.
pub(crate) async fn compatible_versions(
    memo: &RequestMemo,
    step: &ResolverStep,
    current: &PackageRequirement,
    global_direct: Option<ResolverStrategy>,
    global_transitive: Option<ResolverStrategy>,
    timeout: Duration,
) -> Result<CandidateSelection, ResolverError> {
    match step.filtered_versions.get(&current.name) {
        // a version was already chosen on this path, the candidates are fixed
        Some((versions, true)) => Ok(CandidateSelection {
            versions: versions.clone(),
            global_override: true,
            try_relaxed: false,
        }),
        Some((versions, false)) => Ok(refilter_chosen(step, current, versions)),
        None => fresh_selection(memo, step, current, global_direct, global_transitive, timeout)
            .await,
    }
}

/// The name already has a filtered-versions entry: narrow it by the
/// current requirement, falling back to prerelease admission.
fn refilter_chosen(
    step: &ResolverStep,
    current: &PackageRequirement,
    versions: &[VersionCache],
) -> CandidateSelection {
    let ignore_prereleases = !current.parent.is_root();
    let compatible: Vec<VersionCache> = versions
        .iter()
        .filter(|c| {
            current
                .version_requirement
                .is_in_range(&c.version, ignore_prereleases)
        })
        .cloned()
        .collect();
    if !compatible.is_empty() {
        return CandidateSelection {
            versions: compatible,
            global_override: false,
            try_relaxed: false,
        };
    }
    let with_prereleases: Vec<VersionCache> = versions
        .iter()
        .filter(|c| {
            current
                .version_requirement
                .including_prereleases(PreReleaseStatus::All)
                .is_in_range(&c.version, true)
        })
        .cloned()
        .collect();
    let try_relaxed = !step.relax && !with_prereleases.is_empty();
    CandidateSelection {
        versions: with_prereleases,
        global_override: false,
        try_relaxed,
    }
}

async fn fresh_selection(
    memo: &RequestMemo,
    step: &ResolverStep,
    current: &PackageRequirement,
    global_direct: Option<ResolverStrategy>,
    global_transitive: Option<ResolverStrategy>,
    timeout: Duration,
) -> Result<CandidateSelection, ResolverError> {
    let requirements_for_name: Vec<&PackageRequirement> = step
        .open_requirements
        .iter()
        .filter(|r| r.name == current.name)
        .collect();

    let available = match current.version_requirement.range.pinned_version() {
        Some(pinned) => pinned_candidates(memo, current, pinned, timeout).await,
        None => {
            let strategy = resolver_strategy(
                global_direct,
                global_transitive,
                &requirements_for_name,
                current,
            );
            listed_candidates(memo, current, strategy, timeout).await?
        }
    };

    if current.version_requirement.range.is_global_override() {
        // the override silences every other requirement on the name
        return Ok(CandidateSelection {
            versions: available,
            global_override: true,
            try_relaxed: false,
        });
    }

    let matching = |requirement_of: &dyn Fn(&PackageRequirement) -> VersionRequirement| {
        available
            .iter()
            .filter(|cache| {
                requirements_for_name
                    .iter()
                    .all(|r| requirement_of(r).is_in_range(&cache.version, false))
            })
            .cloned()
            .collect::<Vec<VersionCache>>()
    };

    let mut versions = matching(&|r| r.version_requirement.clone());
    if versions.is_empty() {
        if current.transitive_prereleases && !current.parent.is_root() {
            // a prerelease ancestor opened this subtree to prereleases
            versions = matching(&|r| {
                r.version_requirement
                    .including_prereleases(PreReleaseStatus::All)
            });
        } else if !available.is_empty() && available.iter().all(|c| c.version.is_prerelease()) {
            // nothing but prereleases exists for the name
            versions = matching(&|r| {
                let status = if r.parent.is_root()
                    && r.version_requirement != VersionRequirement::all_releases()
                {
                    r.version_requirement.prereleases.clone()
                } else {
                    PreReleaseStatus::All
                };
                r.version_requirement.including_prereleases(status)
            });
        }
    }
    Ok(CandidateSelection {
        versions,
        global_override: false,
        try_relaxed: false,
    })
}

/// Candidates for a `Specific`/`OverrideAll` pin: the listed versions
/// equal to the pin, or a synthesized assumed-version entry when no
/// feed reports it.
async fn pinned_candidates(
    memo: &RequestMemo,
    current: &PackageRequirement,
    pinned: &SemVer,
    timeout: Duration,
) -> Vec<VersionCache> {
    let handle = memo.list_versions(&current.sources, &current.name, WorkPriority::LikelyRequired);
    let listed: Vec<VersionCache> = match handle.get_and_report(&current.name, timeout).await {
        Ok(listing) => listing
            .into_iter()
            .filter(|(version, _)| version == pinned)
            .map(|(version, sources)| VersionCache::reported(version, sources))
            .collect(),
        Err(err) => {
            // a pin does not need feed confirmation to be explorable
            log::warn!(
                "could not list versions of {} while checking the pin {pinned}: {err}",
                current.name
            );
            Vec::new()
        }
    };
    if !listed.is_empty() {
        return listed;
    }
    let sources = match &current.parent {
        RequirementSource::Package { source, .. } => {
            let mut sources: Vec<PackageSource> = vec![source.clone()];
            sources.extend(current.sources.iter().cloned());
            sources
        }
        RequirementSource::RootFile => {
            let mut sources = current.sources.clone();
            sources.sort_by_key(|s| (!s.is_local_feed(), s.is_nuget_org()));
            sources
        }
    };
    vec![VersionCache::assumed(pinned.clone(), sources)]
}

/// All versions the feeds list for the name, ordered by the resolver
/// strategy with the oracle's preferred versions prepended.
async fn listed_candidates(
    memo: &RequestMemo,
    current: &PackageRequirement,
    strategy: ResolverStrategy,
    timeout: Duration,
) -> Result<Vec<VersionCache>, ResolverError> {
    let handle = memo.list_versions(&current.sources, &current.name, WorkPriority::LikelyRequired);
    let listing = handle.get_and_report(&current.name, timeout).await?;
    let mut available: Vec<VersionCache> = listing
        .into_iter()
        .map(|(version, sources)| VersionCache::reported(version, sources))
        .collect();
    match strategy {
        ResolverStrategy::Max => available.sort_by(|a, b| b.version.cmp(&a.version)),
        ResolverStrategy::Min => available.sort_by(|a, b| a.version.cmp(&b.version)),
    }
    let preferred = memo.provider().get_preferred_versions(
        strategy,
        &current.sources,
        memo.group(),
        &current.name,
    );
    for (version, sources) in preferred.into_iter().rev() {
        available.retain(|c| c.version != version);
        available.insert(0, VersionCache::reported(version, sources));
    }
    Ok(available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn v(s: &str) -> SemVer {
        s.parse().unwrap()
    }

    fn root(name: &str, requirement: VersionRequirement) -> PackageRequirement {
        PackageRequirement::root(name, requirement, Vec::new())
    }

    #[test]
    fn a_prerelease_only_narrowing_requests_the_relaxed_pass() {
        let chosen = vec![VersionCache::reported(v("2.0.0-beta"), Vec::new())];
        let step = ResolverStep::start(false, BTreeSet::new());
        let current = root("b", VersionRequirement::at_least(SemVer::one()));

        let strict = refilter_chosen(&step, &current, &chosen);
        assert_eq!(strict.versions.len(), 1);
        assert!(strict.try_relaxed);

        let relaxed_step = ResolverStep::start(true, BTreeSet::new());
        let relaxed = refilter_chosen(&relaxed_step, &current, &chosen);
        assert_eq!(relaxed.versions.len(), 1);
        assert!(!relaxed.try_relaxed);
    }

    #[test]
    fn chosen_versions_narrow_without_prereleases_for_root_parents() {
        let chosen = vec![VersionCache::reported(v("1.5.0"), Vec::new())];
        let step = ResolverStep::start(false, BTreeSet::new());
        let current = root("b", VersionRequirement::less_than(SemVer::one()));
        let selection = refilter_chosen(&step, &current, &chosen);
        assert!(selection.versions.is_empty());
        assert!(!selection.try_relaxed);
    }

    #[test]
    fn single_root_requirements_use_the_direct_strategy() {
        let current = root("a", VersionRequirement::all_releases());
        let all = [&current];
        assert_eq!(
            resolver_strategy(None, None, &all, &current),
            ResolverStrategy::Max
        );
        assert_eq!(
            resolver_strategy(Some(ResolverStrategy::Min), None, &all, &current),
            ResolverStrategy::Min
        );
        let mut pinned = current.clone();
        pinned.resolver_strategy_for_direct = Some(ResolverStrategy::Max);
        let all = [&pinned];
        assert_eq!(
            resolver_strategy(Some(ResolverStrategy::Min), None, &all, &pinned),
            ResolverStrategy::Max
        );
    }

    #[test]
    fn shallow_transitive_overrides_win() {
        let mut shallow = root("a", VersionRequirement::all_releases());
        shallow.resolver_strategy_for_transitives = Some(ResolverStrategy::Min);
        shallow.graph = std::sync::Arc::new(
            [root("p", VersionRequirement::all_releases())].into_iter().collect(),
        );
        let mut deep = root("a", VersionRequirement::all_releases());
        deep.resolver_strategy_for_transitives = Some(ResolverStrategy::Max);
        deep.graph = std::sync::Arc::new(
            [
                root("p", VersionRequirement::all_releases()),
                root("q", VersionRequirement::all_releases()),
            ]
            .into_iter()
            .collect(),
        );
        let all = [&shallow, &deep];
        assert_eq!(
            resolver_strategy(None, None, &all, &shallow),
            ResolverStrategy::Min
        );
    }
}
