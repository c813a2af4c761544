// SPDX-License-Identifier: MPL-2.0

//! Conflict memoization: remembered dead ends, per-package conflict
//! counts and the requirement selection they influence.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::cache::VersionCache;
use crate::internal::step::ResolverStep;
use crate::package::PackageName;
use crate::requirement::{PackageFilter, PackageRequirement};
use crate::type_aliases::Map;

/// A requirement set that is known not to have a solution, optionally
/// bound to the filtered-versions selection it was observed under.
#[derive(Debug, Clone, PartialEq)]
struct KnownConflict {
    requirements: BTreeSet<PackageRequirement>,
    selection: Option<(Vec<VersionCache>, bool)>,
}

/// Accumulates conflict knowledge across the whole search (and is
/// cleared for the relaxed retry).
#[derive(Debug, Default)]
pub(crate) struct ConflictTracker {
    known_conflicts: Vec<KnownConflict>,
    conflict_history: Map<PackageName, u32>,
}

impl ConflictTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Forget everything; used before the relaxed second pass.
    pub(crate) fn clear(&mut self) {
        self.known_conflicts.clear();
        self.conflict_history.clear();
    }

    fn boost(&self, name: &PackageName) -> i32 {
        match self.conflict_history.get(name) {
            Some(count) => -(*count as i32),
            None => 0,
        }
    }

    /// The next requirement to satisfy: the minimum of the open set
    /// under the composite ordering, with conflict counts supplying a
    /// negative boost so historically troublesome names come first.
    pub(crate) fn current_requirement<'a>(
        &self,
        package_filter: Option<&PackageFilter>,
        open_requirements: &'a BTreeSet<PackageRequirement>,
    ) -> Option<&'a PackageRequirement> {
        let mut iter = open_requirements.iter();
        let first = iter.next()?;
        let mut min = first;
        let mut min_boost = self.boost(&first.name);
        for candidate in iter {
            let boost = self.boost(&candidate.name);
            if PackageRequirement::compare(candidate, min, package_filter, boost, min_boost)
                == Ordering::Less
            {
                min = candidate;
                min_boost = boost;
            }
        }
        Some(min)
    }

    /// Replay detection: every known conflict whose requirement set is
    /// fully contained in the step's active requirements (and whose
    /// recorded selection, if any, is still the one filtered for its
    /// name). A non-empty result means the current step rediscovered a
    /// dead end and can backtrack without exploring it again.
    pub(crate) fn get_conflicts(
        &self,
        step: &ResolverStep,
        current: &PackageRequirement,
    ) -> BTreeSet<PackageRequirement> {
        let is_active = |r: &PackageRequirement| {
            (step.open_requirements.contains(r) && !r.graph.contains(current))
                || step.closed_requirements.contains(r)
        };
        let mut replayed = BTreeSet::new();
        for known in &self.known_conflicts {
            // keyed by the same minimum-parent requirement boost_conflicts
            // stored the selection under
            let selection_matches = match &known.selection {
                None => true,
                Some(selection) => known
                    .requirements
                    .iter()
                    .min_by(|a, b| a.parent.cmp(&b.parent))
                    .and_then(|min| step.filtered_versions.get(&min.name))
                    .is_some_and(|current_selection| current_selection == selection),
            };
            if selection_matches && known.requirements.iter().all(is_active) {
                replayed.extend(known.requirements.iter().cloned());
            }
        }
        replayed
    }

    /// Record a fresh conflict: bump the count for the current name,
    /// remember the conflict set together with the selection of the
    /// minimum-parent conflict, and emit a slow-resolution warning when
    /// the same names keep conflicting for more than ten seconds.
    pub(crate) fn boost_conflicts(
        &mut self,
        filtered_versions: &Map<PackageName, (Vec<VersionCache>, bool)>,
        current: &PackageRequirement,
        conflicts: &BTreeSet<PackageRequirement>,
        last_conflict_reported: Instant,
        render_report: impl FnOnce() -> String,
    ) -> Instant {
        let is_new_conflict = match self.conflict_history.get_mut(&current.name) {
            Some(count) => {
                *count += 1;
                false
            }
            None => {
                self.conflict_history.insert(current.name.clone(), 1);
                true
            }
        };
        if conflicts.is_empty() {
            return last_conflict_reported;
        }
        let min_parent = conflicts
            .iter()
            .min_by(|a, b| a.parent.cmp(&b.parent))
            .expect("non-empty conflict set");
        let known = KnownConflict {
            requirements: conflicts.clone(),
            selection: step_selection(filtered_versions, &min_parent.name),
        };
        if !self.known_conflicts.contains(&known) {
            self.known_conflicts.push(known);
        }
        if !is_new_conflict && last_conflict_reported.elapsed() >= Duration::from_secs(10) {
            log::warn!("{}", render_report());
            log::warn!("the search is taking longer than expected");
            return Instant::now();
        }
        last_conflict_reported
    }
}

fn step_selection(
    filtered_versions: &Map<PackageName, (Vec<VersionCache>, bool)>,
    name: &PackageName,
) -> Option<(Vec<VersionCache>, bool)> {
    filtered_versions.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::VersionRequirement;

    fn req(name: &str) -> PackageRequirement {
        PackageRequirement::root(name, VersionRequirement::all_releases(), Vec::new())
    }

    #[test]
    fn conflicted_names_are_selected_first() {
        let mut tracker = ConflictTracker::new();
        let open: BTreeSet<_> = [req("a"), req("x")].into_iter().collect();
        assert_eq!(
            tracker.current_requirement(None, &open).unwrap().name,
            "a".into()
        );
        for _ in 0..3 {
            tracker.boost_conflicts(
                &Map::default(),
                &req("x"),
                &BTreeSet::new(),
                Instant::now(),
                String::new,
            );
        }
        assert_eq!(
            tracker.current_requirement(None, &open).unwrap().name,
            "x".into()
        );
    }

    #[test]
    fn recorded_conflicts_replay_in_matching_contexts() {
        let mut tracker = ConflictTracker::new();
        let conflict: BTreeSet<_> = [req("a"), req("b")].into_iter().collect();
        tracker.boost_conflicts(
            &Map::default(),
            &req("a"),
            &conflict,
            Instant::now(),
            String::new,
        );

        let step = ResolverStep {
            relax: false,
            filtered_versions: Map::default(),
            current_resolution: Default::default(),
            closed_requirements: BTreeSet::new(),
            open_requirements: conflict.clone(),
        };
        let replayed = tracker.get_conflicts(&step, &req("c"));
        assert_eq!(replayed, conflict);

        // with `b` no longer active the dead end does not apply
        let partial = ResolverStep {
            open_requirements: [req("a")].into_iter().collect(),
            ..step
        };
        assert!(tracker.get_conflicts(&partial, &req("c")).is_empty());
    }

    #[test]
    fn recorded_selections_replay_under_the_minimum_parent_name() {
        use crate::package::PackageSource;
        use crate::requirement::RequirementSource;
        use crate::version::SemVer;

        let root_req = req("a");
        let mut transitive = req("b");
        transitive.parent = RequirementSource::Package {
            name: "p".into(),
            version: SemVer::one(),
            source: PackageSource::remote("https://api.nuget.org/v3/index.json"),
        };
        let conflict: BTreeSet<_> = [root_req.clone(), transitive.clone()].into_iter().collect();

        // the selection is stored under the minimum-parent name ("a")
        let mut filtered = Map::default();
        filtered.insert(
            root_req.name.clone(),
            (vec![VersionCache::reported(SemVer::one(), Vec::new())], false),
        );
        let mut tracker = ConflictTracker::new();
        tracker.boost_conflicts(&filtered, &root_req, &conflict, Instant::now(), String::new);

        let step = ResolverStep {
            relax: false,
            filtered_versions: filtered,
            current_resolution: Default::default(),
            closed_requirements: conflict.clone(),
            open_requirements: BTreeSet::new(),
        };
        assert_eq!(tracker.get_conflicts(&step, &req("c")), conflict);

        // a different selection for that name no longer replays
        let mut moved = step;
        moved.filtered_versions.insert(
            root_req.name.clone(),
            (vec![VersionCache::reported(SemVer::two(), Vec::new())], false),
        );
        assert!(tracker.get_conflicts(&moved, &req("c")).is_empty());
    }

    #[test]
    fn identical_conflicts_are_recorded_once() {
        let mut tracker = ConflictTracker::new();
        let conflict: BTreeSet<_> = [req("a")].into_iter().collect();
        for _ in 0..2 {
            tracker.boost_conflicts(
                &Map::default(),
                &req("a"),
                &conflict,
                Instant::now(),
                String::new,
            );
        }
        assert_eq!(tracker.known_conflicts.len(), 1);
    }
}
