//! The range matcher: a process-wide snapshot plus the logic that keeps it
//! current.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use super::snapshot::RangeSnapshot;
use super::source::{EmbeddedRangeSource, RangeSource, RefreshPolicy};
use crate::clock::{Clock, SystemClock};

type PendingLoad = Shared<BoxFuture<'static, bool>>;

/// Answers "is this address in a published crawler range?".
///
/// Cloning is cheap and every clone shares the same snapshot. Readers take
/// an `Arc` to the current snapshot, so a refresh never exposes a half-built
/// set of blocks: the old snapshot stays in use until the new one is swapped
/// in whole.
#[derive(Clone)]
pub struct RangeMatcher {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn RangeSource>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Arc<RangeSnapshot>>,
    load: Mutex<LoadState>,
}

struct LoadState {
    pending: Option<PendingLoad>,
    last_failure: Option<Instant>,
    retry_after: Duration,
}

impl LoadState {
    fn new(retry_after: Duration) -> Self {
        Self {
            pending: None,
            last_failure: None,
            retry_after,
        }
    }
}

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

impl RangeMatcher {
    /// A cold matcher. Nothing matches until the first successful load.
    pub fn new(source: Arc<dyn RangeSource>) -> Self {
        Self::with_clock(source, Arc::new(SystemClock))
    }

    pub fn with_clock(source: Arc<dyn RangeSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                snapshot: RwLock::new(Arc::new(RangeSnapshot::empty())),
                load: Mutex::new(LoadState::new(DEFAULT_RETRY_AFTER)),
            }),
        }
    }

    /// A matcher populated from a compiled-in snapshot at construction.
    pub fn embedded(source: EmbeddedRangeSource) -> Self {
        let snapshot = source.snapshot();
        let matcher = Self::new(Arc::new(source));
        matcher.install(snapshot);
        matcher
    }

    /// Spacing between load attempts after a failure.
    pub fn retry_after(self, retry_after: Duration) -> Self {
        self.set_retry_after(retry_after);
        self
    }

    /// Change the failure spacing. Applies to every clone.
    pub fn set_retry_after(&self, retry_after: Duration) {
        self.inner.load.lock().retry_after = retry_after;
    }

    /// The snapshot currently in use.
    pub fn snapshot(&self) -> Arc<RangeSnapshot> {
        Arc::clone(&self.inner.snapshot.read())
    }

    /// Synchronous membership test against the current snapshot. Malformed
    /// addresses and a cold snapshot both answer `false`.
    pub fn matches(&self, address: &str) -> bool {
        self.snapshot().matches(address)
    }

    /// Load the snapshot if it has never been loaded or its source says it is
    /// stale. Concurrent callers share a single load.
    pub async fn ensure_fresh(&self) {
        if let Some(pending) = self.start_load(false) {
            pending.await;
        }
    }

    /// Force a load now, joining one already in flight. Returns whether a new
    /// snapshot was installed; on failure the previous one stays.
    pub async fn refresh(&self) -> bool {
        match self.start_load(true) {
            Some(pending) => pending.await,
            None => false,
        }
    }

    /// Join the load in flight, or start one if `force` is set or the
    /// snapshot is stale. The check and the start happen under one lock.
    fn start_load(&self, force: bool) -> Option<PendingLoad> {
        let mut state = self.inner.load.lock();
        if let Some(pending) = &state.pending {
            return Some(pending.clone());
        }
        if !force && !self.is_stale(&state) {
            return None;
        }
        let inner = Arc::clone(&self.inner);
        let pending = async move { inner.load_and_swap().await }.boxed().shared();
        state.pending = Some(pending.clone());
        Some(pending)
    }

    fn is_stale(&self, state: &LoadState) -> bool {
        let now = self.inner.clock.now();
        if let Some(failed) = state.last_failure {
            if now.saturating_duration_since(failed) < state.retry_after {
                return false;
            }
        }
        let fetched_at = self.inner.snapshot.read().fetched_at;
        match (fetched_at, self.inner.source.refresh_policy()) {
            (None, _) => true,
            (Some(_), RefreshPolicy::Never) => false,
            (Some(at), RefreshPolicy::After(ttl)) => now.saturating_duration_since(at) >= ttl,
        }
    }

    fn install(&self, snapshot: RangeSnapshot) {
        *self.inner.snapshot.write() = Arc::new(snapshot);
    }
}

impl Inner {
    async fn load_and_swap(self: Arc<Self>) -> bool {
        let _clear = ClearPending(&self);
        match self.source.load().await {
            Ok(snapshot) => {
                info!(
                    ipv4 = snapshot.ipv4.len(),
                    ipv6 = snapshot.ipv6.len(),
                    "installed range snapshot"
                );
                let mut state = self.load.lock();
                *self.snapshot.write() = Arc::new(snapshot);
                state.last_failure = None;
                true
            }
            Err(e) => {
                let kept = Arc::clone(&self.snapshot.read());
                warn!(
                    error = %e,
                    ipv4 = kept.ipv4.len(),
                    ipv6 = kept.ipv6.len(),
                    "range refresh failed, keeping previous snapshot"
                );
                self.load.lock().last_failure = Some(self.clock.now());
                false
            }
        }
    }
}

/// Clears the pending handle when a load ends, however it ends.
struct ClearPending<'a>(&'a Inner);

impl Drop for ClearPending<'_> {
    fn drop(&mut self) {
        self.0.load.lock().pending = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{FetchError, RangeError};
    use crate::ranges::snapshot::PrefixList;

    struct CountingSource {
        loads: AtomicUsize,
        fail: AtomicBool,
        prefixes: Mutex<Vec<String>>,
        clock: ManualClock,
    }

    impl CountingSource {
        fn new(clock: &ManualClock, prefix: &str) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                prefixes: Mutex::new(vec![prefix.to_string()]),
                clock: clock.clone(),
            })
        }
    }

    #[async_trait]
    impl RangeSource for CountingSource {
        async fn load(&self) -> Result<RangeSnapshot, RangeError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Timeout {
                    url: "test".into(),
                }
                .into());
            }
            let list = PrefixList {
                ipv4_prefixes: self.prefixes.lock().clone(),
                ..PrefixList::default()
            };
            Ok(RangeSnapshot::from_prefix_list(&list, self.clock.now()))
        }

        fn refresh_policy(&self) -> RefreshPolicy {
            RefreshPolicy::After(Duration::from_secs(600))
        }
    }

    #[tokio::test]
    async fn cold_matcher_matches_nothing() {
        let clock = ManualClock::new();
        let source = CountingSource::new(&clock, "66.249.64.0/19");
        let matcher = RangeMatcher::with_clock(source.clone(), Arc::new(clock));

        assert!(!matcher.matches("66.249.66.1"));
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);

        matcher.ensure_fresh().await;
        assert!(matcher.matches("66.249.66.1"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let clock = ManualClock::new();
        let source = CountingSource::new(&clock, "66.249.64.0/19");
        let matcher = RangeMatcher::with_clock(source.clone(), Arc::new(clock));

        let calls = (0..16).map(|_| {
            let matcher = matcher.clone();
            async move { matcher.ensure_fresh().await }
        });
        futures::future::join_all(calls).await;

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(matcher.matches("66.249.66.1"));
    }

    #[tokio::test]
    async fn reloads_only_after_ttl() {
        let clock = ManualClock::new();
        let source = CountingSource::new(&clock, "66.249.64.0/19");
        let matcher = RangeMatcher::with_clock(source.clone(), Arc::new(clock.clone()));

        matcher.ensure_fresh().await;
        clock.advance(Duration::from_secs(599));
        matcher.ensure_fresh().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        *source.prefixes.lock() = vec!["192.178.5.0/27".to_string()];
        clock.advance(Duration::from_secs(1));
        matcher.ensure_fresh().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert!(matcher.matches("192.178.5.1"));
        assert!(!matcher.matches("66.249.66.1"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let clock = ManualClock::new();
        let source = CountingSource::new(&clock, "66.249.64.0/19");
        let matcher = RangeMatcher::with_clock(source.clone(), Arc::new(clock.clone()))
            .retry_after(Duration::from_secs(30));

        matcher.ensure_fresh().await;
        source.fail.store(true, Ordering::SeqCst);
        clock.advance(Duration::from_secs(700));

        assert!(!matcher.refresh().await);
        assert!(matcher.matches("66.249.66.1"));

        // inside the retry window nothing is fetched
        matcher.ensure_fresh().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(30));
        source.fail.store(false, Ordering::SeqCst);
        matcher.ensure_fresh().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn embedded_matcher_is_ready_without_io() {
        let matcher = RangeMatcher::embedded(EmbeddedRangeSource::bundled());
        assert!(matcher.matches("66.249.66.1"));
        assert!(matcher.start_load(false).is_none());
    }

    #[tokio::test]
    async fn retry_spacing_applies_to_shared_matchers() {
        let clock = ManualClock::new();
        let source = CountingSource::new(&clock, "66.249.64.0/19");
        let matcher = RangeMatcher::with_clock(source.clone(), Arc::new(clock.clone()));
        let shared = matcher.clone();
        shared.set_retry_after(Duration::from_secs(5));

        source.fail.store(true, Ordering::SeqCst);
        matcher.ensure_fresh().await;
        clock.advance(Duration::from_secs(4));
        matcher.ensure_fresh().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(1));
        source.fail.store(false, Ordering::SeqCst);
        matcher.ensure_fresh().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert!(shared.matches("66.249.66.1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn callers_racing_a_finishing_load_do_not_reload() {
        let clock = ManualClock::new();
        let source = CountingSource::new(&clock, "66.249.64.0/19");
        let matcher = RangeMatcher::with_clock(source.clone(), Arc::new(clock));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let matcher = matcher.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        matcher.ensure_fresh().await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(matcher.matches("66.249.66.1"));
    }
}
