// SPDX-License-Identifier: MPL-2.0

//! The prioritized request pool feeding oracle calls to a bounded set
//! of workers.
//!
//! Requests carry a mutable priority; parked workers receive new work
//! directly, otherwise the lowest-valued pending request is served
//! first. Cancellation gives running requests a 500 ms soft deadline
//! followed by a 1 s hard deadline, after which the request's
//! completion is failed while the real work finishes in the background.

use std::cmp::Reverse;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use priority_queue::PriorityQueue;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{ResolverError, SourceError};
use crate::package::PackageName;
use crate::type_aliases::Map;

/// How soon a submitted request is needed. Workers always pick the
/// request with the lowest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkPriority {
    /// The resolver is blocked on the result right now.
    BlockingWork = 1,
    /// The result will almost certainly be needed.
    LikelyRequired = 3,
    /// The result may be needed if the search goes this way.
    MightBeRequired = 5,
    /// Opportunistic prefetching.
    BackgroundWork = 10,
}

/// A cooperative cancellation signal with child linkage: cancelling a
/// token cancels every token derived from it.
#[derive(Clone)]
pub struct CancellationToken {
    chain: Vec<Arc<watch::Sender<bool>>>,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            chain: vec![Arc::new(tx)],
        }
    }

    /// A token that is cancelled when either it or this token is.
    pub fn child_token(&self) -> Self {
        let (tx, _) = watch::channel(false);
        let mut chain = self.chain.clone();
        chain.push(Arc::new(tx));
        Self { chain }
    }

    /// Cancel this token (and thereby all tokens derived from it).
    pub fn cancel(&self) {
        if let Some(own) = self.chain.last() {
            let _ = own.send(true);
        }
    }

    /// Cancel after a delay, without blocking the caller.
    pub fn cancel_after(&self, delay: Duration) {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            token.cancel();
        });
    }

    /// Whether this token or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|tx| *tx.borrow())
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receivers: Vec<_> = self.chain.iter().map(|tx| tx.subscribe()).collect();
        loop {
            if receivers.iter().any(|rx| *rx.borrow()) {
                return;
            }
            let changes: Vec<_> = receivers
                .iter_mut()
                .map(|rx| Box::pin(rx.changed()))
                .collect();
            let _ = futures::future::select_all(changes).await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// How a pooled request can fail.
#[derive(Debug, Clone, Error)]
pub enum WorkError {
    /// The underlying oracle call failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The request was cancelled and did not finish within the grace
    /// period. The real work may still complete in the background.
    #[error("the request was cancelled")]
    Cancelled,
}

/// The completion slot shared by a request and everyone awaiting it.
/// The first write wins; later writes are ignored.
struct Completion<T> {
    slot: Arc<watch::Sender<Option<Result<T, WorkError>>>>,
    timed_out: AtomicBool,
}

impl<T: Clone> Completion<T> {
    fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(None);
        Arc::new(Self {
            slot: Arc::new(tx),
            timed_out: AtomicBool::new(false),
        })
    }

    fn complete(&self, result: Result<T, WorkError>) {
        let mut result = Some(result);
        self.slot.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = result.take();
                true
            } else {
                false
            }
        });
    }

    fn peek(&self) -> Option<Result<T, WorkError>> {
        self.slot.borrow().clone()
    }

    async fn wait(&self) -> Result<T, WorkError> {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(WorkError::Cancelled);
            }
        }
    }

    /// Record a timeout on this request; `true` for the first one.
    fn mark_timed_out(&self) -> bool {
        !self.timed_out.swap(true, AtomicOrdering::SeqCst)
    }
}

type RequestWork = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

struct QueueInner {
    pending: PriorityQueue<u64, Reverse<WorkPriority>>,
    items: Map<u64, RequestWork>,
    waiters: VecDeque<oneshot::Sender<RequestWork>>,
    next_id: u64,
}

/// The shared request pool.
pub struct ResolverRequestQueue {
    inner: Mutex<QueueInner>,
}

/// A reprioritizable, awaitable handle for a submitted request.
pub struct WorkHandle<T> {
    queue: Arc<ResolverRequestQueue>,
    id: u64,
    sources: Arc<Vec<String>>,
    completion: Arc<Completion<T>>,
}

impl<T> Clone for WorkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            id: self.id,
            sources: Arc::clone(&self.sources),
            completion: Arc::clone(&self.completion),
        }
    }
}

impl ResolverRequestQueue {
    /// An empty pool. Workers are attached with
    /// [start_processing](Self::start_processing).
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner {
                pending: PriorityQueue::new(),
                items: Map::default(),
                waiters: VecDeque::new(),
                next_id: 0,
            }),
        })
    }

    /// Submit a request. When a worker is parked the work is handed to
    /// it directly, otherwise it queues at the given priority.
    pub fn add_work<T, F, Fut>(
        self: &Arc<Self>,
        priority: WorkPriority,
        source_urls: Vec<String>,
        work: F,
    ) -> WorkHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
    {
        let completion = Completion::new();
        let run = wrap_request(work, Arc::clone(&completion));
        let id = self.submit(priority, run);
        WorkHandle {
            queue: Arc::clone(self),
            id,
            sources: Arc::new(source_urls),
            completion,
        }
    }

    fn submit(&self, priority: WorkPriority, work: RequestWork) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let mut work = work;
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(work) {
                Ok(()) => return id,
                Err(returned) => work = returned,
            }
        }
        inner.items.insert(id, work);
        inner.pending.push(id, Reverse(priority));
        id
    }

    fn change_priority(&self, id: u64, priority: WorkPriority, only_higher: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&Reverse(current)) = inner.pending.get_priority(&id) {
            if !only_higher || priority < current {
                inner.pending.change_priority(&id, Reverse(priority));
            }
        }
    }

    /// Pick up the most urgent pending request, parking until one
    /// arrives. Returns `None` once the token is cancelled.
    async fn get_work(&self, token: &CancellationToken) -> Option<RequestWork> {
        let rx = {
            let mut inner = self.inner.lock().unwrap();
            if let Some((id, _)) = inner.pending.pop() {
                return inner.items.remove(&id);
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };
        tokio::select! {
            work = rx => work.ok(),
            _ = token.cancelled() => None,
        }
    }

    /// Attach a worker. It serves requests until the token fires; a
    /// request still running at cancellation gets a 500 ms soft
    /// deadline on its linked token before the worker is released.
    pub fn start_processing(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            while !token.is_cancelled() {
                let Some(work) = queue.get_work(&token).await else {
                    break;
                };
                let linked = token.child_token();
                let mut execution = pin!(work(linked.clone()));
                tokio::select! {
                    _ = &mut execution => {}
                    _ = token.cancelled() => {
                        linked.cancel_after(Duration::from_millis(500));
                        // bounded by the request wrapper's grace period
                        execution.await;
                    }
                }
            }
        })
    }
}

/// The per-request execution wrapper: the real work runs as its own
/// task so it can outlive cancellation; after the token fires the
/// wrapper waits one more second, then fails the completion with a
/// timeout fault and lets the work finish in the background.
fn wrap_request<T, F, Fut>(work: F, completion: Arc<Completion<T>>) -> RequestWork
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
{
    Box::new(move |token: CancellationToken| -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let task_completion = Arc::clone(&completion);
            let task_token = token.clone();
            let mut task = tokio::spawn(async move {
                let result = work(task_token).await;
                task_completion.complete(result.map_err(WorkError::Source));
            });
            tokio::select! {
                joined = &mut task => {
                    if let Err(panic) = joined {
                        completion.complete(Err(WorkError::Source(SourceError::new(
                            format!("request worker failed: {panic}"),
                        ))));
                    }
                }
                _ = token.cancelled() => {
                    if tokio::time::timeout(Duration::from_secs(1), &mut task)
                        .await
                        .is_err()
                    {
                        completion.complete(Err(WorkError::Cancelled));
                    }
                }
            }
        })
    })
}

impl<T: Clone + Send + Sync + 'static> WorkHandle<T> {
    /// Set the priority unconditionally (pending requests only).
    pub fn reprioritize(&self, priority: WorkPriority) {
        self.queue.change_priority(self.id, priority, false);
    }

    /// Raise the priority; with `only_higher` the request never gets
    /// less urgent than it already is.
    pub fn try_reprioritize(&self, only_higher: bool, priority: WorkPriority) {
        self.queue.change_priority(self.id, priority, only_higher);
    }

    /// The result, if the request already finished.
    pub fn peek(&self) -> Option<Result<T, WorkError>> {
        self.completion.peek()
    }

    /// Wait for the result without a deadline.
    pub async fn wait(&self) -> Result<T, WorkError> {
        self.completion.wait().await
    }

    /// Consume the handle the way the resolver driver does: return a
    /// finished result immediately, otherwise bump the request to
    /// [BlockingWork](WorkPriority::BlockingWork) and wait up to the
    /// configured budget. The first timeout enumerates the source urls;
    /// a later wait on the same handle fails tersely.
    pub async fn get_and_report(
        &self,
        package: &PackageName,
        timeout: Duration,
    ) -> Result<T, ResolverError> {
        if let Some(result) = self.peek() {
            return result.map_err(ResolverError::from);
        }
        self.reprioritize(WorkPriority::BlockingWork);
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result.map_err(ResolverError::from),
            Err(_) if self.completion.mark_timed_out() => Err(ResolverError::Timeout {
                package: package.clone(),
                sources: self.sources.as_ref().clone(),
                timeout,
            }),
            Err(_) => Err(ResolverError::TimeoutAgain {
                package: package.clone(),
            }),
        }
    }
}

impl From<WorkError> for ResolverError {
    fn from(err: WorkError) -> Self {
        match err {
            WorkError::Source(source) => ResolverError::Source(source),
            WorkError::Cancelled => ResolverError::Cancelled,
        }
    }
}

/// Pool sizing and wait budgets, read from the environment once at
/// resolver entry.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of workers attached to the pool.
    pub workers: usize,
    /// Budget for one blocking wait in [WorkHandle::get_and_report].
    pub request_timeout: Duration,
}

impl QueueConfig {
    const DEFAULT_WORKERS: usize = 6;
    const DEFAULT_TIMEOUT_MS: u64 = 180_000;

    /// Read `PAKET_RESOLVER_WORKERS` and `PAKET_RESOLVER_TASK_TIMEOUT`.
    /// Invalid values warn and fall back to the defaults.
    pub fn from_env() -> Self {
        let workers = match std::env::var("PAKET_RESOLVER_WORKERS") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    log::warn!(
                        "PAKET_RESOLVER_WORKERS is set to '{raw}', which is not a positive \
                         integer; using {}",
                        Self::DEFAULT_WORKERS
                    );
                    Self::DEFAULT_WORKERS
                }
            },
            Err(_) => Self::DEFAULT_WORKERS,
        };
        let request_timeout = match std::env::var("PAKET_RESOLVER_TASK_TIMEOUT") {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    log::warn!(
                        "PAKET_RESOLVER_TASK_TIMEOUT is set to '{raw}', which is not a number \
                         of milliseconds; using {}",
                        Self::DEFAULT_TIMEOUT_MS
                    );
                    Duration::from_millis(Self::DEFAULT_TIMEOUT_MS)
                }
            },
            Err(_) => Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
        };
        Self {
            workers,
            request_timeout,
        }
    }
}
