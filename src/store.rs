//! On-demand shard loading with shared in-flight requests.
//!
//! At most one fetch per bucket runs at a time: concurrent callers await the
//! same shared future. Parsed shards are kept for the life of the store.
//! Unavailable and timed-out loads are forgotten so a later call retries;
//! malformed shards are remembered and not fetched again.

use crate::cache::ShardCache;
use crate::error::ShardError;
use crate::shard::{Bucket, Shard};
use crate::source::ShardSource;
use ahash::AHashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

type LoadResult = Result<Arc<Shard>, ShardError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

pub struct ShardStore {
    source: Arc<dyn ShardSource>,
    loaded: RwLock<AHashMap<Bucket, Arc<Shard>>>,
    rejected: RwLock<AHashMap<Bucket, ShardError>>,
    in_flight: Mutex<AHashMap<Bucket, SharedLoad>>,
    load_timeout: Duration,
    cache: Option<ShardCache>,
}

impl std::fmt::Debug for ShardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // one lock at a time; `ensure_loaded` nests `loaded` inside `in_flight`
        let loaded = read(&self.loaded).len();
        let in_flight = lock(&self.in_flight).len();
        f.debug_struct("ShardStore")
            .field("loaded", &loaded)
            .field("in_flight", &in_flight)
            .field("load_timeout", &self.load_timeout)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ShardStore {
    pub fn new(source: Arc<dyn ShardSource>) -> Self {
        Self {
            source,
            loaded: RwLock::default(),
            rejected: RwLock::default(),
            in_flight: Mutex::default(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            cache: None,
        }
    }

    #[must_use]
    pub const fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    /// Keep compiled shards in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: ShardCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub const fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    /// Make `bucket`'s shard available, fetching it if needed.
    ///
    /// Idempotent: a loaded bucket returns immediately, and concurrent calls
    /// for one bucket share a single fetch.
    pub async fn ensure_loaded(&self, bucket: Bucket) -> LoadResult {
        let load = {
            let mut in_flight = lock(&self.in_flight);
            if let Some(shard) = self.cached(bucket) {
                return Ok(shard);
            }
            if let Some(err) = read(&self.rejected).get(&bucket) {
                return Err(err.clone());
            }
            in_flight
                .entry(bucket)
                .or_insert_with(|| self.start_load(bucket))
                .clone()
        };

        let result = load.clone().await;

        // A bucket is always either in flight or settled, never neither.
        match &result {
            Ok(shard) => {
                write(&self.loaded)
                    .entry(bucket)
                    .or_insert_with(|| Arc::clone(shard));
            }
            Err(err @ ShardError::Malformed { .. }) => {
                write(&self.rejected).insert(bucket, err.clone());
            }
            Err(_) => {}
        }
        let mut in_flight = lock(&self.in_flight);
        if in_flight.get(&bucket).is_some_and(|l| l.ptr_eq(&load)) {
            in_flight.remove(&bucket);
            if let Err(err) = &result {
                tracing::warn!(%bucket, "Shard load failed: {}", err);
            }
        }
        result
    }

    fn start_load(&self, bucket: Bucket) -> SharedLoad {
        tracing::debug!(%bucket, "Fetching shard");
        let fetch = self.source.fetch(bucket);
        let cache = self.cache.clone();
        let after = self.load_timeout;

        async move {
            let payload = tokio::time::timeout(after, fetch)
                .await
                .map_err(|_| ShardError::TimedOut { bucket, after })??;
            let shard = compile(bucket, &payload, cache.as_ref()).await?;
            tracing::info!(%bucket, entries = shard.len(), "Loaded shard");
            Ok::<_, ShardError>(Arc::new(shard))
        }
        .boxed()
        .shared()
    }

    /// The shard for `bucket` if it has been loaded.
    pub fn cached(&self, bucket: Bucket) -> Option<Arc<Shard>> {
        read(&self.loaded).get(&bucket).cloned()
    }

    /// Every loaded shard, in bucket order.
    pub fn all_loaded_shards(&self) -> Vec<Arc<Shard>> {
        let mut shards: Vec<_> = read(&self.loaded).values().cloned().collect();
        shards.sort_by_key(|s| s.bucket());
        shards
    }

    /// Whether `bucket` was rejected as malformed.
    pub fn is_rejected(&self, bucket: Bucket) -> bool {
        read(&self.rejected).contains_key(&bucket)
    }

    pub fn is_loading(&self, bucket: Bucket) -> bool {
        lock(&self.in_flight).contains_key(&bucket)
    }
}

/// Parse a payload, going through the compiled-shard cache when configured.
async fn compile(
    bucket: Bucket,
    payload: &str,
    cache: Option<&ShardCache>,
) -> Result<Shard, ShardError> {
    let Some(cache) = cache else {
        return Shard::parse(bucket, payload);
    };
    let digest = ShardCache::digest(payload);
    if let Some(shard) = cache.load(bucket, digest).await {
        return Ok(shard);
    }
    let shard = Shard::parse(bucket, payload)?;
    cache.store(&shard, digest).await;
    Ok(shard)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
