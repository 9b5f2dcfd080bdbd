//! Keyed cache of live tenant connections with single-flight initialisation.
//!
//! Each tenant key holds either a ready handle or one pending initialisation.
//! The first caller for a missing key spawns the initialisation as its own
//! task; every concurrent caller awaits the same shared result, so at most one
//! backend pool is opened per key. A failed initialisation removes the key so
//! the next request retries.
//!
//! # Eviction
//!
//! [`ConnectionCache::evict`] removes the entry at once, so later lookups
//! miss, and hands the handle to a retirement task. The task closes the handle
//! as soon as no request holds a reference to it, or when the eviction grace
//! period runs out, whichever comes first. An initialisation that completes
//! after its key was evicted still answers its waiters, then is retired the
//! same way instead of being cached.
//!
//! # Example
//!
//! ```rust,ignore
//! use tenantry_core::cache::{CacheConfig, ConnectionCache};
//!
//! let cache = ConnectionCache::new(CacheConfig::default());
//! let handle = cache
//!     .get_or_create(&tenant, || async move { factory.connect(config).await })
//!     .await?;
//! assert!(cache.get(&tenant).is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{TenantError, TenantResult};
use crate::handle::ConnectionHandle;
use crate::id::TenantId;

/// What happens to cached handles of tenants deactivated after caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleHandlePolicy {
    /// Cached handles stay usable until explicitly evicted.
    #[default]
    Retain,
    /// Cache hits older than `interval` since the last check re-read the
    /// tenant's status; inactive or removed tenants are evicted.
    Revalidate {
        /// Minimum time between status checks for one tenant.
        interval: Duration,
    },
}

/// Configuration for the connection cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Longest time an evicted handle stays open while still referenced.
    pub eviction_grace: Duration,
    /// How often a retiring handle is checked for remaining references.
    pub drain_poll: Duration,
    /// Deactivation handling for cached handles.
    pub stale_handle_policy: StaleHandlePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction_grace: Duration::from_secs(30),
            drain_poll: Duration::from_millis(250),
            stale_handle_policy: StaleHandlePolicy::Retain,
        }
    }
}

impl CacheConfig {
    /// Set the eviction grace period.
    pub fn with_eviction_grace(mut self, grace: Duration) -> Self {
        self.eviction_grace = grace;
        self
    }

    /// Set the drain poll interval.
    pub fn with_drain_poll(mut self, poll: Duration) -> Self {
        self.drain_poll = poll;
        self
    }

    /// Set the stale handle policy.
    pub fn with_stale_handle_policy(mut self, policy: StaleHandlePolicy) -> Self {
        self.stale_handle_policy = policy;
        self
    }
}

/// Cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered by a ready entry.
    pub hits: u64,
    /// Lookups that started an initialisation.
    pub misses: u64,
    /// Lookups that joined a pending initialisation.
    pub coalesced: u64,
    /// Initialisations that produced a cached handle.
    pub initializations: u64,
    /// Initialisations that failed.
    pub failures: u64,
    /// Entries removed by eviction.
    pub evictions: u64,
    /// Ready entries.
    pub size: usize,
    /// Pending initialisations.
    pub pending: usize,
}

impl CacheStats {
    /// Calculate hit rate.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.coalesced;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe atomic metrics.
#[derive(Default)]
struct AtomicCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    initializations: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicCacheMetrics {
    #[inline]
    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, size: usize, pending: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            initializations: self.initializations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size,
            pending,
        }
    }
}

/// Introspection record for one cached tenant.
#[derive(Debug, Clone, Serialize)]
pub struct CachedTenant {
    /// The tenant key.
    pub tenant: TenantId,
    /// Database the handle is bound to.
    pub database: String,
    /// Whether the handle reports ready.
    pub ready: bool,
    /// When the handle was cached.
    pub cached_at: DateTime<Utc>,
}

type SharedInit = Shared<BoxFuture<'static, TenantResult<ConnectionHandle>>>;

struct ReadyEntry {
    handle: ConnectionHandle,
    cached_at: DateTime<Utc>,
    validated_at: Instant,
}

enum Slot {
    Ready(ReadyEntry),
    Pending { generation: u64, init: SharedInit },
}

struct CacheInner {
    config: CacheConfig,
    slots: Mutex<HashMap<TenantId, Slot>>,
    generation: AtomicU64,
    metrics: AtomicCacheMetrics,
}

/// Process-wide registry of tenant connection handles.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct ConnectionCache {
    inner: Arc<CacheInner>,
}

impl Default for ConnectionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionCache {
    /// Create a cache with the given config.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                slots: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                metrics: AtomicCacheMetrics::default(),
            }),
        }
    }

    /// Get the cache config.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// The ready handle for a tenant, if cached.
    pub fn get(&self, tenant: &TenantId) -> Option<ConnectionHandle> {
        match self.inner.slots.lock().get(tenant) {
            Some(Slot::Ready(entry)) if entry.handle.is_ready() => Some(entry.handle.clone()),
            _ => None,
        }
    }

    /// Return the cached handle or run `init` to create it.
    ///
    /// Concurrent callers for the same missing key share one run of `init`.
    /// `init` is spawned onto the runtime, so dropping the returned future
    /// does not cancel it. A cached handle that no longer reports ready is
    /// retired and replaced.
    pub async fn get_or_create<F, Fut>(
        &self,
        tenant: &TenantId,
        init: F,
    ) -> TenantResult<ConnectionHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TenantResult<ConnectionHandle>> + Send + 'static,
    {
        let metrics = &self.inner.metrics;
        let shared = {
            let mut slots = self.inner.slots.lock();
            let joined = match slots.get(tenant) {
                Some(Slot::Ready(entry)) if entry.handle.is_ready() => {
                    AtomicCacheMetrics::record(&metrics.hits);
                    return Ok(entry.handle.clone());
                }
                Some(Slot::Pending { init, .. }) => Some(init.clone()),
                Some(Slot::Ready(_)) | None => None,
            };
            match joined {
                Some(init) => {
                    AtomicCacheMetrics::record(&metrics.coalesced);
                    init
                }
                None => {
                    if let Some(Slot::Ready(stale)) = slots.remove(tenant) {
                        warn!(tenant = %tenant, "cached connection is no longer ready, replacing");
                        self.retire(tenant, stale.handle);
                    }
                    AtomicCacheMetrics::record(&metrics.misses);
                    let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                    let init = self.spawn_init(tenant.clone(), generation, init());
                    slots.insert(
                        tenant.clone(),
                        Slot::Pending {
                            generation,
                            init: init.clone(),
                        },
                    );
                    init
                }
            }
        };
        shared.await
    }

    fn spawn_init<Fut>(&self, tenant: TenantId, generation: u64, fut: Fut) -> SharedInit
    where
        Fut: Future<Output = TenantResult<ConnectionHandle>> + Send + 'static,
    {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(TenantError::internal("connection initialisation panicked")),
            };
            cache.complete(&tenant, generation, &outcome, started.elapsed());
            outcome
        });
        async move {
            task.await.unwrap_or_else(|e| {
                Err(TenantError::internal(format!("connection initialisation task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }

    fn complete(
        &self,
        tenant: &TenantId,
        generation: u64,
        outcome: &TenantResult<ConnectionHandle>,
        elapsed: Duration,
    ) {
        let metrics = &self.inner.metrics;
        let mut slots = self.inner.slots.lock();
        let current = matches!(
            slots.get(tenant),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        match outcome {
            Ok(handle) if current => {
                AtomicCacheMetrics::record(&metrics.initializations);
                slots.insert(
                    tenant.clone(),
                    Slot::Ready(ReadyEntry {
                        handle: handle.clone(),
                        cached_at: Utc::now(),
                        validated_at: Instant::now(),
                    }),
                );
                info!(
                    tenant = %tenant,
                    database = handle.database(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tenant connection cached"
                );
            }
            Ok(handle) => {
                AtomicCacheMetrics::record(&metrics.initializations);
                drop(slots);
                debug!(tenant = %tenant, "tenant evicted during initialisation, retiring new connection");
                self.retire(tenant, handle.clone());
            }
            Err(err) => {
                AtomicCacheMetrics::record(&metrics.failures);
                if current {
                    slots.remove(tenant);
                }
                warn!(
                    tenant = %tenant,
                    code = %err.code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tenant connection initialisation failed"
                );
            }
        }
    }

    /// Remove one tenant. Returns whether an entry (ready or pending) existed.
    pub fn evict(&self, tenant: &TenantId) -> bool {
        let removed = self.inner.slots.lock().remove(tenant);
        match removed {
            Some(slot) => {
                AtomicCacheMetrics::record(&self.inner.metrics.evictions);
                if let Slot::Ready(entry) = slot {
                    self.retire(tenant, entry.handle);
                }
                info!(tenant = %tenant, "tenant connection evicted");
                true
            }
            None => false,
        }
    }

    /// Remove every tenant. Returns the number of entries removed.
    pub fn evict_all(&self) -> usize {
        let drained: Vec<(TenantId, Slot)> = self.inner.slots.lock().drain().collect();
        let count = drained.len();
        for (tenant, slot) in drained {
            AtomicCacheMetrics::record(&self.inner.metrics.evictions);
            if let Slot::Ready(entry) = slot {
                self.retire(&tenant, entry.handle);
            }
        }
        if count > 0 {
            info!(count, "all tenant connections evicted");
        }
        count
    }

    /// Evict everything and close ready handles without waiting for drain.
    pub async fn shutdown(&self) {
        let drained: Vec<(TenantId, Slot)> = self.inner.slots.lock().drain().collect();
        for (tenant, slot) in drained {
            if let Slot::Ready(entry) = slot {
                debug!(tenant = %tenant, "closing tenant connection");
                entry.handle.close().await;
            }
        }
    }

    fn retire(&self, tenant: &TenantId, handle: ConnectionHandle) {
        let grace = self.inner.config.eviction_grace;
        let poll = self.inner.config.drain_poll.max(Duration::from_millis(1));
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(tenant = %tenant, "no runtime available, dropping evicted connection without close");
            return;
        };
        let tenant = tenant.clone();
        runtime.spawn(async move {
            let deadline = Instant::now() + grace;
            while Arc::strong_count(&handle) > 1 && Instant::now() < deadline {
                tokio::time::sleep(poll).await;
            }
            if Arc::strong_count(&handle) > 1 {
                warn!(tenant = %tenant, "closing evicted connection still in use after grace period");
            }
            handle.close().await;
            debug!(tenant = %tenant, "evicted connection closed");
        });
    }

    /// Sorted identifiers of all ready entries.
    pub fn list(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self
            .inner
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Introspection records for all ready entries, sorted by tenant.
    pub fn entries(&self) -> Vec<CachedTenant> {
        let mut entries: Vec<CachedTenant> = self
            .inner
            .slots
            .lock()
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Ready(entry) => Some(CachedTenant {
                    tenant: id.clone(),
                    database: entry.handle.database().to_string(),
                    ready: entry.handle.is_ready(),
                    cached_at: entry.cached_at,
                }),
                Slot::Pending { .. } => None,
            })
            .collect();
        entries.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        entries
    }

    /// Number of ready entries.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Check if no ready entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of initialisations in flight.
    pub fn pending(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count()
    }

    /// Get a snapshot of the metrics.
    pub fn stats(&self) -> CacheStats {
        let slots = self.inner.slots.lock();
        let pending = slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count();
        self.inner.metrics.snapshot(slots.len() - pending, pending)
    }

    /// Whether the ready entry was last validated longer than `interval` ago.
    pub fn needs_revalidation(&self, tenant: &TenantId, interval: Duration) -> bool {
        match self.inner.slots.lock().get(tenant) {
            Some(Slot::Ready(entry)) => entry.validated_at.elapsed() >= interval,
            _ => false,
        }
    }

    /// Record that the ready entry's tenant was just confirmed active.
    pub fn mark_validated(&self, tenant: &TenantId) {
        if let Some(Slot::Ready(entry)) = self.inner.slots.lock().get_mut(tenant) {
            entry.validated_at = Instant::now();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::handle::TenantConnection;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    pub(crate) struct FakeConnection {
        pub database: String,
        pub ready: AtomicBool,
        pub closed: AtomicBool,
    }

    impl FakeConnection {
        pub fn handle(database: &str) -> ConnectionHandle {
            Arc::new(Self {
                database: database.to_string(),
                ready: AtomicBool::new(true),
                closed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl TenantConnection for FakeConnection {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
        }

        fn database(&self) -> &str {
            &self.database
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    async fn panicking(message: &'static str) -> TenantResult<ConnectionHandle> {
        panic!("{}", message)
    }

    fn fake(handle: &ConnectionHandle) -> &FakeConnection {
        crate::handle::downcast::<FakeConnection>(handle).unwrap()
    }

    fn cache() -> ConnectionCache {
        ConnectionCache::new(
            CacheConfig::default()
                .with_eviction_grace(Duration::from_secs(5))
                .with_drain_poll(Duration::from_millis(100)),
        )
    }

    #[tokio::test]
    async fn test_get_after_create_returns_same_handle() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let created = cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();

        for _ in 0..3 {
            assert!(Arc::ptr_eq(&cache.get(&id).unwrap(), &created));
        }
        let again = cache
            .get_or_create(&id, || panicking("must not initialise twice"))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&again, &created));
        assert_eq!(cache.list(), vec![id]);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_create(&TenantId::domain("acme"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(FakeConnection::handle("acme_db"))
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.initializations, 1);
        assert_eq!(stats.hits + stats.coalesced, 15);
    }

    #[tokio::test]
    async fn test_failure_does_not_poison() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let err = cache
            .get_or_create(&id, || async { Err(TenantError::connection("refused")) })
            .await
            .err().unwrap();
        assert_eq!(err.code, crate::ErrorCode::ConnectionFailed);
        assert!(cache.get(&id).is_none());
        assert_eq!(cache.pending(), 0);

        let handle = cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();
        assert!(handle.is_ready());
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_failure_only_affects_its_key() {
        let cache = cache();
        let good = cache
            .get_or_create(&TenantId::domain("good"), || async {
                Ok(FakeConnection::handle("good_db"))
            })
            .await
            .unwrap();
        let _ = cache
            .get_or_create(&TenantId::domain("bad"), || async {
                Err(TenantError::connection("refused"))
            })
            .await;
        assert!(Arc::ptr_eq(&cache.get(&TenantId::domain("good")).unwrap(), &good));
        assert_eq!(cache.list(), vec![TenantId::domain("good")]);
    }

    #[tokio::test]
    async fn test_panicking_init_is_reported() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let err = cache
            .get_or_create(&id, || panicking("driver bug"))
            .await
            .err().unwrap();
        assert_eq!(err.code, crate::ErrorCode::Internal);
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_init() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let waiter = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create(&id, || async move {
                        let _ = gate.await;
                        Ok(FakeConnection::handle("acme_db"))
                    })
                    .await
            })
        };
        while cache.pending() == 0 {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        let _ = waiter.await;
        release.send(()).unwrap();

        let handle = cache
            .get_or_create(&id, || panicking("must join the running initialisation"))
            .await
            .unwrap();
        assert_eq!(handle.database(), "acme_db");
        assert!(cache.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_not_ready_entry_is_replaced() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let first = cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();
        fake(&first).ready.store(false, Ordering::SeqCst);
        assert!(cache.get(&id).is_none());

        let second = cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_waits_for_references() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let handle = cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();

        assert!(cache.evict(&id));
        assert!(cache.get(&id).is_none());
        assert!(!cache.evict(&id));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!fake(&handle).closed.load(Ordering::SeqCst));

        let probe = Arc::downgrade(&handle);
        drop(handle);
        tokio::time::sleep(Duration::from_millis(300)).await;
        // retirement task released its reference after closing
        assert!(probe.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_closes_after_grace() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let handle = cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();

        cache.evict(&id);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!fake(&handle).closed.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fake(&handle).closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_evict_during_pending_retires_result() {
        let cache = cache();
        let id = TenantId::domain("acme");
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let waiter = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create(&id, || async move {
                        let _ = gate.await;
                        Ok(FakeConnection::handle("acme_db"))
                    })
                    .await
            })
        };
        while cache.pending() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(cache.evict(&id));
        release.send(()).unwrap();

        let handle = waiter.await.unwrap().unwrap();
        assert_eq!(handle.database(), "acme_db");
        assert!(cache.get(&id).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_evict_all_and_shutdown() {
        let cache = cache();
        for name in ["a", "b", "c"] {
            cache
                .get_or_create(&TenantId::domain(name), move || async move {
                    Ok(FakeConnection::handle(name))
                })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.evict_all(), 3);
        assert!(cache.is_empty());

        let handle = cache
            .get_or_create(&TenantId::domain("d"), || async { Ok(FakeConnection::handle("d")) })
            .await
            .unwrap();
        cache.shutdown().await;
        assert!(fake(&handle).closed.load(Ordering::SeqCst));
        assert_eq!(cache.stats().evictions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_tracking() {
        let cache = cache();
        let id = TenantId::domain("acme");
        cache
            .get_or_create(&id, || async { Ok(FakeConnection::handle("acme_db")) })
            .await
            .unwrap();
        let interval = Duration::from_secs(60);
        assert!(!cache.needs_revalidation(&id, interval));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.needs_revalidation(&id, interval));
        cache.mark_validated(&id);
        assert!(!cache.needs_revalidation(&id, interval));
    }
}
