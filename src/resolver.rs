// SPDX-License-Identifier: MPL-2.0

//! Top-level glue: wiring the request pool, the prefetcher and the
//! state machine together, plus the relaxed retry.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::frameworks::FrameworkRestrictions;
use crate::internal::machine::{run, MachineContext, SearchOutcome, StackPack};
use crate::internal::step::ResolverStep;
use crate::package::GroupName;
use crate::prefetch::RequestMemo;
use crate::provider::PackageProvider;
use crate::queue::{CancellationToken, QueueConfig, ResolverRequestQueue};
use crate::requirement::{PackageRequirement, ResolverStrategy, UpdateMode};
use crate::error::ResolverError;
use crate::resolution::ResolverResult;

/// The run-wide knobs of a resolver invocation.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// The dependency group being resolved.
    pub group: GroupName,
    /// Default strategy for direct dependencies.
    pub global_direct_strategy: Option<ResolverStrategy>,
    /// Default strategy for transitive dependencies.
    pub global_transitive_strategy: Option<ResolverStrategy>,
    /// Restrictions the whole resolution is scoped to.
    pub global_framework_restrictions: FrameworkRestrictions,
    /// How already-locked packages may move.
    pub update_mode: UpdateMode,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            group: GroupName::main(),
            global_direct_strategy: None,
            global_transitive_strategy: None,
            global_framework_restrictions: FrameworkRestrictions::default(),
            update_mode: UpdateMode::Install,
        }
    }
}

/// Main function of the library.
///
/// Finds a single consistent assignment of one version per transitively
/// reachable package for the given root requirements, asking `provider`
/// for version listings and package details through a prioritized
/// worker pool. When the strict pass fails but only because prerelease
/// admission was too strict, the search is retried once in relaxed mode
/// with the conflict memory cleared.
///
/// Worker count and the blocking-wait budget are read from
/// `PAKET_RESOLVER_WORKERS` and `PAKET_RESOLVER_TASK_TIMEOUT` once at
/// entry. Must be called from within a Tokio runtime.
///
/// `Err` is reserved for fatal failures (a feed that cannot even list
/// versions, or a resolver invariant violation); an unsatisfiable set
/// of requirements is a regular [Conflict](crate::Resolution::Conflict)
/// result.
pub async fn resolve(
    provider: Arc<dyn PackageProvider>,
    config: ResolverConfig,
    root_requirements: impl IntoIterator<Item = PackageRequirement>,
) -> Result<ResolverResult, ResolverError> {
    let queue_config = QueueConfig::from_env();
    let queue = ResolverRequestQueue::new();
    let token = CancellationToken::new();
    let workers: Vec<_> = (0..queue_config.workers)
        .map(|_| queue.start_processing(token.clone()))
        .collect();

    let ctx = MachineContext {
        memo: RequestMemo::new(Arc::clone(&queue), provider, config.group.clone()),
        group: config.group,
        global_direct: config.global_direct_strategy,
        global_transitive: config.global_transitive_strategy,
        global_restrictions: config.global_framework_restrictions,
        update_mode: config.update_mode,
        request_timeout: queue_config.request_timeout,
        token: token.clone(),
    };
    let roots: BTreeSet<PackageRequirement> = root_requirements.into_iter().collect();
    let mut stackpack = StackPack::new();

    let mut outcome = run(&ctx, &mut stackpack, ResolverStep::start(false, roots.clone())).await;
    let retry_relaxed = matches!(
        &outcome,
        Ok(strict) if !strict.resolution.is_done() && strict.try_relaxed
    );
    if retry_relaxed {
        log::info!("no strict resolution, retrying with relaxed prerelease admission");
        stackpack.conflicts.clear();
        outcome = run(&ctx, &mut stackpack, ResolverStep::start(true, roots)).await;
    }

    // cleanup runs regardless of how the search ended
    token.cancel();
    for worker in workers {
        if let Err(join_error) = worker.await {
            if outcome.is_ok() {
                log::warn!("resolver worker failed during shutdown: {join_error}");
            }
        }
    }

    outcome.map(|SearchOutcome { resolution, errors, .. }| {
        if resolution.is_done() {
            for error in &errors {
                log::warn!("{error}");
            }
        }
        ResolverResult { resolution, errors }
    })
}
