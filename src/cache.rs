//! Time-to-live cache in front of the earthquake feed.
//!
//! Freshness is checked lazily on every read; nothing refreshes in the
//! background. A failed refresh keeps serving the last good dataset.

use crate::error::FetchError;
use crate::feed::FeedSource;
use crate::types::Dataset;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const CACHE_TTL_SECS: u64 = 20 * 60; // 20 minutes

/// Observable state of the cache at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Empty,
    Fresh,
    Stale,
}

/// Result of a cache read.
#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    pub dataset: Dataset,
    pub fetched_at: DateTime<Utc>,
    /// Set when the most recent refresh failed and `dataset` is the fallback.
    pub stale: bool,
    pub last_error: Option<String>,
}

struct CacheEntry {
    dataset: Dataset,
    cached_at: Instant,
    fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            cached_at: Instant::now(),
            fetched_at: Utc::now(),
        }
    }

    fn snapshot(&self, last_error: Option<String>) -> DatasetSnapshot {
        DatasetSnapshot {
            dataset: self.dataset.clone(),
            fetched_at: self.fetched_at,
            stale: last_error.is_some(),
            last_error,
        }
    }
}

enum CacheState {
    Empty,
    Fresh(CacheEntry),
    /// Manually invalidated; the next read refreshes regardless of age.
    Invalidated(CacheEntry),
}

struct Inner {
    state: CacheState,
    last_error: Option<String>,
}

impl Inner {
    fn status(&self, ttl: Duration) -> CacheStatus {
        match &self.state {
            CacheState::Empty => CacheStatus::Empty,
            CacheState::Invalidated(_) => CacheStatus::Stale,
            CacheState::Fresh(entry) if entry.cached_at.elapsed() < ttl => CacheStatus::Fresh,
            CacheState::Fresh(_) => CacheStatus::Stale,
        }
    }

    fn snapshot(&self) -> Option<DatasetSnapshot> {
        match &self.state {
            CacheState::Empty => None,
            CacheState::Fresh(entry) | CacheState::Invalidated(entry) => {
                Some(entry.snapshot(self.last_error.clone()))
            }
        }
    }
}

/// Dataset cache owned by the application and shared through Tauri state.
///
/// The lock is held across the whole check-refresh-store sequence, so
/// concurrent misses result in a single upstream fetch.
pub struct DatasetCache<S> {
    source: S,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl<S: FeedSource> DatasetCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_ttl(source, Duration::from_secs(CACHE_TTL_SECS))
    }

    pub fn with_ttl(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            inner: Mutex::new(Inner {
                state: CacheState::Empty,
                last_error: None,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    #[cfg(test)]
    pub(crate) async fn status(&self) -> CacheStatus {
        self.inner.lock().await.status(self.ttl)
    }

    /// Whether a manual invalidation is waiting for the next read.
    #[cfg(test)]
    pub(crate) async fn is_invalidated(&self) -> bool {
        matches!(self.inner.lock().await.state, CacheState::Invalidated(_))
    }

    /// Current dataset, refreshing from the feed if needed.
    pub async fn get_dataset(&self) -> Result<Dataset, FetchError> {
        self.read().await.map(|snapshot| snapshot.dataset)
    }

    /// Like [`get_dataset`](Self::get_dataset), with fetch time and fallback details.
    pub async fn read(&self) -> Result<DatasetSnapshot, FetchError> {
        let mut inner = self.inner.lock().await;

        let status = inner.status(self.ttl);
        if status == CacheStatus::Fresh {
            if let Some(snapshot) = inner.snapshot() {
                return Ok(snapshot);
            }
        }

        debug!(?status, "refreshing earthquake dataset");

        match self.source.fetch().await {
            Ok(dataset) => {
                info!(events = dataset.len(), "earthquake dataset cached");
                let entry = CacheEntry::new(dataset);
                let snapshot = entry.snapshot(None);
                inner.state = CacheState::Fresh(entry);
                inner.last_error = None;
                Ok(snapshot)
            }
            Err(e) => {
                let previous = std::mem::replace(&mut inner.state, CacheState::Empty);
                match previous {
                    CacheState::Empty => {
                        warn!(error = %e, "initial earthquake fetch failed");
                        Err(e)
                    }
                    CacheState::Fresh(entry) | CacheState::Invalidated(entry) => {
                        warn!(error = %e, "refresh failed, serving previous dataset");
                        let message = e.to_string();
                        let snapshot = entry.snapshot(Some(message.clone()));
                        // The failed attempt consumes the invalidation.
                        inner.state = CacheState::Fresh(entry);
                        inner.last_error = Some(message);
                        Ok(snapshot)
                    }
                }
            }
        }
    }

    /// Force a refresh on the next read, whatever the dataset's age.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        let state = std::mem::replace(&mut inner.state, CacheState::Empty);
        inner.state = match state {
            CacheState::Fresh(entry) | CacheState::Invalidated(entry) => {
                CacheState::Invalidated(entry)
            }
            CacheState::Empty => CacheState::Empty,
        };
        info!("earthquake dataset invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SeismicEvent;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Feed double that replays scripted results and counts calls.
    /// Once the script runs out it returns a dataset tagged with the call number.
    struct ScriptedFeed {
        calls: AtomicUsize,
        script: std::sync::Mutex<VecDeque<Result<Dataset, FetchError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedFeed {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: std::sync::Mutex::new(VecDeque::new()),
                delay: None,
            }
        }

        fn with_script(script: Vec<Result<Dataset, FetchError>>) -> Self {
            Self {
                script: std::sync::Mutex::new(script.into()),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedFeed {
        async fn fetch(&self) -> Result<Dataset, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(dataset(&format!("call {call}"))))
        }
    }

    fn dataset(place: &str) -> Dataset {
        vec![SeismicEvent {
            magnitude: Some(4.5),
            place: place.to_string(),
            latitude: 37.8,
            longitude: -122.4,
        }]
    }

    fn ttl() -> Duration {
        Duration::from_secs(CACHE_TTL_SECS)
    }

    // ---- EMPTY ----

    #[tokio::test(start_paused = true)]
    async fn test_starts_empty_and_fetches_on_first_read() {
        let cache = DatasetCache::new(ScriptedFeed::new());
        assert_eq!(cache.status().await, CacheStatus::Empty);
        assert_eq!(cache.source().calls(), 0);

        let data = cache.get_dataset().await.unwrap();
        assert_eq!(data[0].place, "call 1");
        assert_eq!(cache.source().calls(), 1);
        assert_eq!(cache.status().await, CacheStatus::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_failure_surfaces_error_and_stays_empty() {
        let feed = ScriptedFeed::with_script(vec![Err(FetchError::HttpStatus { status: 500 })]);
        let cache = DatasetCache::new(feed);

        let result = cache.get_dataset().await;
        assert!(matches!(result, Err(FetchError::HttpStatus { status: 500 })));
        assert_eq!(cache.status().await, CacheStatus::Empty);

        // Next read retries
        let data = cache.get_dataset().await.unwrap();
        assert_eq!(data[0].place, "call 2");
    }

    // ---- FRESH ----

    #[tokio::test(start_paused = true)]
    async fn test_reads_within_ttl_hit_cache() {
        let cache = DatasetCache::new(ScriptedFeed::new());

        let first = cache.get_dataset().await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        let second = cache.get_dataset().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let cache = DatasetCache::new(ScriptedFeed::new());
        cache.get_dataset().await.unwrap();

        tokio::time::advance(ttl() - Duration::from_secs(1)).await;
        let data = cache.get_dataset().await.unwrap();
        assert_eq!(data[0].place, "call 1");
        assert_eq!(cache.source().calls(), 1);

        // Now TTL + 1s since the fetch
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.status().await, CacheStatus::Stale);
        let data = cache.get_dataset().await.unwrap();
        assert_eq!(data[0].place, "call 2");
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_ttl_is_stale() {
        let cache = DatasetCache::new(ScriptedFeed::new());
        cache.get_dataset().await.unwrap();

        tokio::time::advance(ttl()).await;
        assert_eq!(cache.status().await, CacheStatus::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_ttl() {
        let cache = DatasetCache::with_ttl(ScriptedFeed::new(), Duration::from_secs(5));
        cache.get_dataset().await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.get_dataset().await.unwrap();
        assert_eq!(cache.source().calls(), 2);
    }

    // ---- invalidate ----

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_exactly_one_refetch() {
        let cache = DatasetCache::new(ScriptedFeed::new());
        cache.get_dataset().await.unwrap();

        cache.invalidate().await;
        assert!(cache.is_invalidated().await);
        assert_eq!(cache.status().await, CacheStatus::Stale);

        let data = cache.get_dataset().await.unwrap();
        assert_eq!(data[0].place, "call 2");
        assert!(!cache.is_invalidated().await);

        cache.get_dataset().await.unwrap();
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_invalidate_still_one_refetch() {
        let cache = DatasetCache::new(ScriptedFeed::new());
        cache.get_dataset().await.unwrap();

        cache.invalidate().await;
        cache.invalidate().await;
        cache.get_dataset().await.unwrap();
        cache.get_dataset().await.unwrap();

        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_on_empty_is_harmless() {
        let cache = DatasetCache::new(ScriptedFeed::new());
        cache.invalidate().await;

        assert_eq!(cache.status().await, CacheStatus::Empty);
        cache.get_dataset().await.unwrap();
        assert_eq!(cache.source().calls(), 1);
    }

    // ---- stale-while-revalidate ----

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_serves_previous_dataset() {
        let feed = ScriptedFeed::with_script(vec![
            Ok(dataset("good")),
            Err(FetchError::Network("connection reset".to_string())),
        ]);
        let cache = DatasetCache::new(feed);
        cache.get_dataset().await.unwrap();

        cache.invalidate().await;
        let snapshot = cache.read().await.unwrap();

        assert_eq!(snapshot.dataset[0].place, "good");
        assert!(snapshot.stale);
        assert!(snapshot
            .last_error
            .as_deref()
            .unwrap_or_default()
            .contains("connection reset"));
        assert!(!cache.is_invalidated().await);
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_ttl_retries_on_next_read() {
        let feed = ScriptedFeed::with_script(vec![
            Ok(dataset("good")),
            Err(FetchError::HttpStatus { status: 502 }),
        ]);
        let cache = DatasetCache::new(feed);
        cache.get_dataset().await.unwrap();

        tokio::time::advance(ttl() + Duration::from_secs(1)).await;
        let fallback = cache.read().await.unwrap();
        assert_eq!(fallback.dataset[0].place, "good");
        assert!(fallback.stale);

        let recovered = cache.read().await.unwrap();
        assert_eq!(recovered.dataset[0].place, "call 3");
        assert!(!recovered.stale);
        assert!(recovered.last_error.is_none());
        assert_eq!(cache.source().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_keeps_original_fetch_time() {
        let feed = ScriptedFeed::with_script(vec![
            Ok(dataset("good")),
            Err(FetchError::Parse("bad body".to_string())),
        ]);
        let cache = DatasetCache::new(feed);
        let first = cache.read().await.unwrap();

        cache.invalidate().await;
        let fallback = cache.read().await.unwrap();
        assert_eq!(first.fetched_at, fallback.fetched_at);
    }

    // ---- concurrency ----

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_fetch_once() {
        let feed = ScriptedFeed {
            delay: Some(Duration::from_millis(250)),
            ..ScriptedFeed::new()
        };
        let cache = DatasetCache::new(feed);

        let (a, b) = tokio::join!(cache.get_dataset(), cache.get_dataset());

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(cache.source().calls(), 1);
    }
}
