// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use paket_resolver::{
    resolve, FrameworkRestriction, FrameworkRestrictions, InstallSettings, OfflinePackageProvider,
    PackageName, PackageRequirement, Resolution, ResolverConfig, ResolverError, ResolverResult,
    ResolverStrategy, SemVer, VersionRange, VersionRequirement,
};

fn v(s: &str) -> SemVer {
    s.parse().unwrap()
}

fn root(name: &str, requirement: VersionRequirement) -> PackageRequirement {
    PackageRequirement::root(name, requirement, Vec::new())
}

fn pkg(
    provider: &mut OfflinePackageProvider,
    name: &str,
    version: &str,
    deps: &[(&str, VersionRequirement)],
) {
    provider.add_package(name, v(version), deps.iter().cloned());
}

async fn run(provider: OfflinePackageProvider, roots: Vec<PackageRequirement>) -> ResolverResult {
    let _ = env_logger::builder().is_test(true).try_init();
    resolve(Arc::new(provider), ResolverConfig::default(), roots)
        .await
        .expect("the search must not fail fatally")
}

fn version_of(result: &ResolverResult, name: &str) -> SemVer {
    result
        .resolution
        .as_ok()
        .expect("expected a resolution")
        .get(&PackageName::new(name))
        .unwrap_or_else(|| panic!("{name} missing from the resolution"))
        .version
        .clone()
}

#[tokio::test]
async fn resolves_the_highest_admissible_version() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    pkg(&mut provider, "a", "1.1.0", &[]);

    let result = run(provider, vec![root("a", VersionRequirement::at_least(v("1.0.0")))]).await;
    assert_eq!(version_of(&result, "a"), v("1.1.0"));
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn transitive_requirements_meet_a_root_pin() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "b", "1.0.0", &[]);
    pkg(&mut provider, "b", "2.0.0", &[]);
    pkg(
        &mut provider,
        "a",
        "1.0.0",
        &[("b", VersionRequirement::at_least(SemVer::one()))],
    );
    pkg(
        &mut provider,
        "a",
        "2.0.0",
        &[("b", VersionRequirement::at_least(SemVer::one()))],
    );

    let result = run(
        provider,
        vec![
            root("a", VersionRequirement::at_least(SemVer::one())),
            root("b", VersionRequirement::exactly(SemVer::two())),
        ],
    )
    .await;
    assert_eq!(version_of(&result, "a"), v("2.0.0"));
    assert_eq!(version_of(&result, "b"), v("2.0.0"));
}

#[tokio::test]
async fn incompatible_transitive_requirements_conflict() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "c", "1.0.0", &[]);
    pkg(&mut provider, "c", "2.0.0", &[]);
    pkg(
        &mut provider,
        "a",
        "1.0.0",
        &[("c", VersionRequirement::at_least(SemVer::two()))],
    );
    pkg(
        &mut provider,
        "b",
        "1.0.0",
        &[("c", VersionRequirement::less_than(SemVer::two()))],
    );

    let result = run(
        provider,
        vec![
            root("a", VersionRequirement::exactly(SemVer::one())),
            root("b", VersionRequirement::exactly(SemVer::one())),
        ],
    )
    .await;

    let Resolution::Conflict(info) = &result.resolution else {
        panic!("expected a conflict");
    };
    assert_eq!(info.requirement.name, PackageName::new("c"));
    let conflicts = result.resolution.get_conflicts();
    assert!(conflicts
        .iter()
        .any(|r| r.version_requirement.range == VersionRange::Minimum(SemVer::two())));
    assert!(conflicts
        .iter()
        .any(|r| r.version_requirement.range == VersionRange::LessThan(SemVer::two())));

    let report = result.resolution.get_error_text(true);
    assert!(report.contains("Could not resolve package c"));
    assert!(report.contains("requested package c"));
    assert!(report.contains("2.0.0"));
}

#[tokio::test]
async fn prerelease_only_packages_fall_back_to_prereleases() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0-beta", &[]);

    let mut requirement = root("a", VersionRequirement::all_releases());
    requirement.transitive_prereleases = true;
    let result = run(provider, vec![requirement]).await;
    assert_eq!(version_of(&result, "a"), v("1.0.0-beta"));
}

#[tokio::test]
async fn prerelease_parents_open_their_subtree_to_prereleases() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "b", "2.0.0-rc", &[]);
    pkg(
        &mut provider,
        "a",
        "1.0.0-beta",
        &[("b", VersionRequirement::all_releases())],
    );

    let mut requirement = root("a", VersionRequirement::all_releases());
    requirement.transitive_prereleases = true;
    let result = run(provider, vec![requirement]).await;
    assert_eq!(version_of(&result, "a"), v("1.0.0-beta"));
    assert_eq!(version_of(&result, "b"), v("2.0.0-rc"));
}

#[tokio::test]
async fn backtracks_over_multiple_levels() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "c", "1.0.0", &[]);
    pkg(&mut provider, "c", "2.0.0", &[]);
    pkg(
        &mut provider,
        "a",
        "2.0.0",
        &[("c", VersionRequirement::exactly(SemVer::one()))],
    );
    pkg(
        &mut provider,
        "a",
        "1.0.0",
        &[("c", VersionRequirement::exactly(SemVer::two()))],
    );
    pkg(
        &mut provider,
        "b",
        "2.0.0",
        &[("c", VersionRequirement::exactly(SemVer::two()))],
    );

    let result = run(
        provider,
        vec![
            root("a", VersionRequirement::all_releases()),
            root("b", VersionRequirement::all_releases()),
        ],
    )
    .await;
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
    assert_eq!(version_of(&result, "b"), v("2.0.0"));
    assert_eq!(version_of(&result, "c"), v("2.0.0"));
}

#[tokio::test]
async fn unlisted_versions_are_used_only_as_a_second_pass() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    provider.mark_unlisted("a", v("1.0.0"));

    let result = run(provider, vec![root("a", VersionRequirement::all_releases())]).await;
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
}

#[tokio::test]
async fn a_global_override_silences_transitive_requirements() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    pkg(&mut provider, "a", "2.0.0", &[]);
    pkg(
        &mut provider,
        "b",
        "1.0.0",
        &[("a", VersionRequirement::at_least(SemVer::two()))],
    );

    let result = run(
        provider,
        vec![
            root("a", VersionRequirement::override_all(SemVer::one())),
            root("b", VersionRequirement::all_releases()),
        ],
    )
    .await;
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
    assert_eq!(version_of(&result, "b"), v("1.0.0"));
}

#[tokio::test]
async fn a_pin_nobody_lists_is_assumed() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    pkg(&mut provider, "a", "3.0.0", &[]);
    provider.omit_from_listing("a", v("3.0.0"));

    let result = run(
        provider,
        vec![root("a", VersionRequirement::exactly(v("3.0.0")))],
    )
    .await;
    assert_eq!(version_of(&result, "a"), v("3.0.0"));
}

#[tokio::test]
async fn cycles_terminate() {
    let mut provider = OfflinePackageProvider::new();
    pkg(
        &mut provider,
        "a",
        "1.0.0",
        &[("b", VersionRequirement::all_releases())],
    );
    pkg(
        &mut provider,
        "b",
        "1.0.0",
        &[("a", VersionRequirement::all_releases())],
    );

    let result = run(provider, vec![root("a", VersionRequirement::all_releases())]).await;
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
    assert_eq!(version_of(&result, "b"), v("1.0.0"));
}

#[tokio::test]
async fn exploration_failures_reject_the_candidate_and_are_reported() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    pkg(&mut provider, "a", "1.1.0", &[]);
    provider.fail_details_of("a", v("1.1.0"), "feed returned 503");

    let result = run(provider, vec![root("a", VersionRequirement::all_releases())]).await;
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, ResolverError::Explore { .. })));
}

#[tokio::test]
async fn the_min_strategy_prefers_the_lowest_version() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    pkg(&mut provider, "a", "2.0.0", &[]);

    let config = ResolverConfig {
        global_direct_strategy: Some(ResolverStrategy::Min),
        ..ResolverConfig::default()
    };
    let result = resolve(
        Arc::new(provider),
        config,
        vec![root("a", VersionRequirement::at_least(SemVer::one()))],
    )
    .await
    .unwrap();
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
}

#[tokio::test]
async fn preferred_versions_are_tried_first() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "a", "1.0.0", &[]);
    pkg(&mut provider, "a", "2.0.0", &[]);
    provider.set_preferred("a", [v("1.0.0")]);

    let result = run(provider, vec![root("a", VersionRequirement::all_releases())]).await;
    assert_eq!(version_of(&result, "a"), v("1.0.0"));
}

#[tokio::test]
async fn framework_restrictions_drop_inapplicable_dependencies() {
    let mut provider = OfflinePackageProvider::new();
    provider.add_package_with_restrictions(
        "a",
        SemVer::one(),
        [
            (
                PackageName::new("legacy"),
                VersionRequirement::all_releases(),
                FrameworkRestrictions::Explicit(FrameworkRestriction::frameworks(["net45"])),
            ),
            (
                PackageName::new("modern"),
                VersionRequirement::all_releases(),
                FrameworkRestrictions::Explicit(FrameworkRestriction::frameworks([
                    "netstandard2.0",
                ])),
            ),
        ],
    );
    pkg(&mut provider, "legacy", "1.0.0", &[]);
    pkg(&mut provider, "modern", "1.0.0", &[]);

    let mut requirement = root("a", VersionRequirement::all_releases());
    requirement.settings = InstallSettings::with_restriction(FrameworkRestriction::frameworks([
        "netstandard2.0",
    ]));
    let result = run(provider, vec![requirement]).await;
    let model = result.resolution.as_ok().unwrap();
    assert!(model.contains_key(&PackageName::new("modern")));
    assert!(!model.contains_key(&PackageName::new("legacy")));
}

#[tokio::test]
async fn dependency_names_adopt_the_resolved_casing() {
    let mut provider = OfflinePackageProvider::new();
    pkg(&mut provider, "Newtonsoft.Json", "1.0.0", &[]);
    pkg(
        &mut provider,
        "a",
        "1.0.0",
        &[("newtonsoft.json", VersionRequirement::all_releases())],
    );

    let result = run(provider, vec![root("a", VersionRequirement::all_releases())]).await;
    let model = result.resolution.as_ok().unwrap();
    let a = &model[&PackageName::new("a")];
    let (dep_name, _, _) = a.dependencies.iter().next().unwrap();
    assert_eq!(dep_name.as_str(), "Newtonsoft.Json");
}

#[tokio::test]
async fn empty_roots_resolve_to_an_empty_model() {
    let provider = OfflinePackageProvider::new();
    let result = run(provider, Vec::new()).await;
    assert!(result.resolution.as_ok().unwrap().is_empty());
}

#[tokio::test]
async fn missing_packages_produce_a_no_versions_report() {
    let provider = OfflinePackageProvider::new();
    let result = run(
        provider,
        vec![root("ghost", VersionRequirement::at_least(SemVer::one()))],
    )
    .await;
    assert!(!result.is_done());
    let report = result.resolution.get_error_text(false);
    assert!(report.contains("No versions available for ghost"));
    assert!(result.clone().ok_or_fail().is_err());
}
