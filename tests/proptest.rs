// SPDX-License-Identifier: MPL-2.0

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::collection::{btree_map, btree_set, vec};
use proptest::prelude::*;
use proptest::sample::Index;

use paket_resolver::{
    cleanup_names, filter_by_restrictions, resolve, DependencySet, FrameworkRestriction,
    FrameworkRestrictions, OfflinePackageProvider, PackageName, PackageRequirement, Resolution,
    ResolverConfig, ResolverResult, SemVer, VersionRequirement,
};

type Registry = Vec<(String, SemVer, Vec<(String, VersionRequirement)>)>;

/// Generate a random registry index plus root picks. Dependencies only
/// point at packages with a smaller id, so every generated index is a
/// DAG and the interesting part stays version selection, not cycles.
fn registry_and_roots() -> impl Strategy<Value = (Registry, Vec<Index>)> {
    let versions = btree_set(0u32..4, 1..=3usize);
    let crates = btree_map(0u8..8, versions, 1..=6usize);
    let raw_deps = vec((any::<Index>(), any::<Index>(), any::<Index>(), any::<Index>()), 0..=25);
    let roots = vec(any::<Index>(), 1..=3usize);
    (crates, raw_deps, roots).prop_map(|(crates, raw_deps, roots)| {
        let ids: Vec<(u8, u32)> = crates
            .iter()
            .flat_map(|(name, vers)| vers.iter().map(move |v| (*name, *v)))
            .collect();
        let mut deps_of: HashMap<(u8, u32), Vec<(String, VersionRequirement)>> = HashMap::new();
        for (a, b, c, d) in raw_deps {
            if ids.len() < 2 {
                break;
            }
            let (ai, bi) = (a.index(ids.len()), b.index(ids.len()));
            let (dep_id, _) = ids[ai.min(bi)];
            let (pkg_id, pkg_ver) = ids[ai.max(bi)];
            if dep_id == pkg_id {
                continue;
            }
            let dep_versions: Vec<u32> = crates[&dep_id].iter().copied().collect();
            let (lo, hi) = {
                let (c, d) = (c.index(dep_versions.len()), d.index(dep_versions.len()));
                (c.min(d), c.max(d))
            };
            let semver = |v: u32| SemVer::new(v, 0, 0);
            let requirement = if lo == 0 && hi == dep_versions.len() - 1 {
                VersionRequirement::all_releases()
            } else if lo == hi {
                VersionRequirement::exactly(semver(dep_versions[lo]))
            } else if lo == 0 {
                VersionRequirement::less_than(semver(dep_versions[hi] + 1))
            } else if hi == dep_versions.len() - 1 {
                VersionRequirement::at_least(semver(dep_versions[lo]))
            } else {
                VersionRequirement::between(semver(dep_versions[lo]), semver(dep_versions[hi] + 1))
            };
            deps_of
                .entry((pkg_id, pkg_ver))
                .or_default()
                .push((format!("p{dep_id}"), requirement));
        }
        let registry: Registry = ids
            .iter()
            .map(|(id, ver)| {
                let mut deps = deps_of.remove(&(*id, *ver)).unwrap_or_default();
                deps.sort_by(|a, b| a.0.cmp(&b.0));
                deps.dedup_by(|a, b| a.0 == b.0);
                (format!("p{id}"), SemVer::new(*ver, 0, 0), deps)
            })
            .collect();
        (registry, roots)
    })
}

fn provider_of(registry: &Registry) -> OfflinePackageProvider {
    let mut provider = OfflinePackageProvider::new();
    for (name, version, deps) in registry {
        provider.add_package(
            name.as_str(),
            version.clone(),
            deps.iter().map(|(n, r)| (n.as_str(), r.clone())),
        );
    }
    provider
}

fn root_requirements(registry: &Registry, picks: &[Index]) -> Vec<PackageRequirement> {
    let names: Vec<&String> = registry
        .iter()
        .map(|(name, _, _)| name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    picks
        .iter()
        .map(|pick| {
            PackageRequirement::root(
                names[pick.index(names.len())].as_str(),
                VersionRequirement::all_releases(),
                Vec::new(),
            )
        })
        .collect()
}

fn run_resolver(registry: &Registry, roots: Vec<PackageRequirement>) -> ResolverResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime
        .block_on(resolve(
            Arc::new(provider_of(registry)),
            ResolverConfig::default(),
            roots,
        ))
        .expect("in-memory searches never fail fatally")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Soundness and closure: every dependency of every resolved
    /// package is itself resolved, at a version inside the declared
    /// range; and every root requirement is part of the model.
    #[test]
    fn resolved_models_are_sound_and_closed((registry, picks) in registry_and_roots()) {
        let roots = root_requirements(&registry, &picks);
        let result = run_resolver(&registry, roots.clone());
        if let Some(model) = result.resolution.as_ok() {
            for root in &roots {
                let resolved = model.get(&root.name);
                prop_assert!(resolved.is_some(), "root {} missing", root.name);
                prop_assert!(root
                    .version_requirement
                    .is_in_range(&resolved.unwrap().version, false));
            }
            for package in model.values() {
                for (dep_name, requirement, _) in &package.dependencies {
                    let resolved = model.get(dep_name);
                    prop_assert!(
                        resolved.is_some(),
                        "dependency {dep_name} of {} missing",
                        package.name
                    );
                    prop_assert!(
                        requirement.is_in_range(&resolved.unwrap().version, false),
                        "{} {} does not satisfy {dep_name} {requirement}",
                        dep_name,
                        resolved.unwrap().version
                    );
                }
            }
        }
    }

    /// With an empty conflict memory, two sequential runs over the same
    /// inputs produce identical resolutions.
    #[test]
    fn identical_runs_resolve_identically((registry, picks) in registry_and_roots()) {
        let roots = root_requirements(&registry, &picks);
        let one = run_resolver(&registry, roots.clone());
        let two = run_resolver(&registry, roots);
        match (&one.resolution, &two.resolution) {
            (Resolution::Ok(a), Resolution::Ok(b)) => prop_assert_eq!(a, b),
            (Resolution::Conflict(a), Resolution::Conflict(b)) => {
                prop_assert_eq!(&a.requirement.name, &b.requirement.name);
                prop_assert_eq!(one.resolution.get_conflicts(), two.resolution.get_conflicts());
            }
            _ => prop_assert!(false, "one run resolved, the other conflicted"),
        }
    }

    /// Name canonicalization is idempotent.
    #[test]
    fn cleanup_names_is_idempotent((registry, picks) in registry_and_roots()) {
        let roots = root_requirements(&registry, &picks);
        let result = run_resolver(&registry, roots);
        if let Some(model) = result.resolution.as_ok() {
            let once = cleanup_names(model.clone());
            let twice = cleanup_names(once.clone());
            prop_assert_eq!(once, twice);
        }
    }

    /// The dependency filter only ever removes entries, keeps exactly
    /// the intersecting ones, and is the identity for `NoRestriction`.
    #[test]
    fn dependency_filter_is_a_restriction(
        kept in btree_set("[a-f][0-9]", 0..4usize),
        entries in vec(("[a-z]{1,4}", btree_set("[a-f][0-9]", 0..4usize)), 0..6usize),
    ) {
        let deps: DependencySet = entries
            .into_iter()
            .map(|(name, frameworks)| {
                let restriction = if frameworks.is_empty() {
                    FrameworkRestrictions::AutoDetect
                } else {
                    FrameworkRestrictions::Explicit(FrameworkRestriction::frameworks(frameworks))
                };
                (PackageName::new(name), VersionRequirement::all_releases(), restriction)
            })
            .collect();
        prop_assert_eq!(
            filter_by_restrictions(&FrameworkRestriction::NoRestriction, &deps),
            deps.clone()
        );
        let restriction = FrameworkRestriction::frameworks(kept);
        let filtered = filter_by_restrictions(&restriction, &deps);
        prop_assert!(filtered.is_subset(&deps));
        for dep in &deps {
            let survives = restriction.intersects(&dep.2.explicit_restriction());
            prop_assert_eq!(filtered.contains(dep), survives);
        }
    }
}
