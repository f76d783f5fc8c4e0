//! Incremental search over lazily loaded shards.
//!
//! Every keystroke is tagged with a sequence number. A keystroke whose buckets
//! are merged is answered synchronously; otherwise it becomes a
//! [`PendingQuery`] that loads the missing shards and is then answered, but
//! only published if no newer keystroke was issued in the meantime. Published
//! snapshots therefore never go backwards in issue order.
//!
//! Loads started by a superseded keystroke still merge their shard, so later
//! queries benefit from them.

use crate::cache::ShardCache;
use crate::config::SearchConfig;
use crate::error::ShardError;
use crate::index::MergedIndex;
use crate::matcher::{Query, QueryMatcher};
use crate::ranker::{Ranker, ResultSet};
use crate::shard::Bucket;
use crate::source::ShardSource;
use crate::store::{ShardStore, lock, read, write};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(120);
pub const DEFAULT_MEMO_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No query in progress. Initial state, and the state after a failed load.
    Idle,
    /// Waiting for shards the latest query needs.
    Loading,
    /// Results for the latest query are published.
    Ready,
}

/// What subscribers see after every change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Sequence number of the keystroke this snapshot belongs to.
    pub seq: u64,
    pub state: SessionState,
    /// Normalized query text.
    pub query: String,
    /// Latest published results. Kept while a newer query is loading.
    pub results: Arc<ResultSet>,
    /// Load failure that ended the last query, if any.
    pub error: Option<ShardError>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            seq: 0,
            state: SessionState::Idle,
            query: String::new(),
            results: Arc::new(ResultSet::empty("")),
            error: None,
        }
    }
}

/// A keystroke waiting on shard loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub seq: u64,
    pub query: Query,
    /// Buckets to load before the query can be fully answered.
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone)]
pub enum Keystroke {
    /// Every needed bucket was merged; these results are published.
    Ready(Arc<ResultSet>),
    /// Shards must load first; pass this to [`SearchSession::complete`].
    Pending(PendingQuery),
}

type Memo = Mutex<LruCache<(String, u64), Arc<ResultSet>>>;

pub struct SearchSession {
    store: ShardStore,
    index: RwLock<MergedIndex>,
    matcher: QueryMatcher,
    ranker: Ranker,
    debounce: Duration,
    issued: AtomicU64,
    memo: Option<Memo>,
    events: watch::Sender<Snapshot>,
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("store", &self.store)
            .field("entries", &self.entry_count())
            .field("debounce", &self.debounce)
            .field("issued", &self.issued)
            .finish_non_exhaustive()
    }
}

impl SearchSession {
    pub fn new(store: ShardStore, matcher: QueryMatcher, ranker: Ranker) -> Self {
        let (events, _) = watch::channel(Snapshot::default());
        Self {
            store,
            index: RwLock::default(),
            matcher,
            ranker,
            debounce: DEFAULT_DEBOUNCE,
            issued: AtomicU64::new(0),
            memo: new_memo(DEFAULT_MEMO_CAPACITY),
            events,
        }
    }

    /// Build a session over `source` with the store, matcher and ranker
    /// configured from `config`.
    pub fn from_config(source: Arc<dyn ShardSource>, config: &SearchConfig) -> Self {
        let mut store = ShardStore::new(source).with_load_timeout(config.load_timeout());
        if let Some(dir) = config.cache_path() {
            store = store.with_cache(ShardCache::new(dir));
        }
        Self::new(
            store,
            QueryMatcher::new(config.min_query_len),
            Ranker::new(config.limit),
        )
        .with_debounce(config.debounce())
        .with_memo_capacity(config.memo_capacity)
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Number of memoized result sets; `0` disables memoization.
    #[must_use]
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.memo = new_memo(capacity);
        self
    }

    pub const fn store(&self) -> &ShardStore {
        &self.store
    }

    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Answer `text` from whatever is merged right now. Buckets that are not
    /// merged show up as partial coverage.
    pub fn search(&self, text: &str) -> Arc<ResultSet> {
        self.compute(&Query::parse(text))
    }

    fn compute(&self, query: &Query) -> Arc<ResultSet> {
        if query.is_empty() {
            return Arc::new(ResultSet::empty(""));
        }
        let index = read(&self.index);
        let key = (query.normalized().to_string(), index.generation());
        if let Some(memo) = &self.memo
            && let Some(hit) = lock(memo).get(&key)
        {
            tracing::trace!(query = query.normalized(), "Memoized result");
            return Arc::clone(hit);
        }
        let outcome = self.matcher.match_query(&index, query);
        drop(index);

        let results = Arc::new(self.ranker.rank(outcome, query));
        if let Some(memo) = &self.memo {
            lock(memo).put(key, Arc::clone(&results));
        }
        results
    }

    /// Register a keystroke.
    ///
    /// Returns the published results when every bucket the query needs is
    /// merged; otherwise publishes [`SessionState::Loading`] and returns the
    /// pending query.
    pub fn begin(&self, text: &str) -> Keystroke {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let query = Query::parse(text);

        if query.is_empty() {
            let results = self.compute(&query);
            self.publish(seq, SessionState::Idle, &query, Arc::clone(&results), None);
            return Keystroke::Ready(results);
        }

        let buckets = self.unmerged_buckets(&query);
        if buckets.is_empty() {
            let results = self.compute(&query);
            self.publish(seq, SessionState::Ready, &query, Arc::clone(&results), None);
            return Keystroke::Ready(results);
        }

        tracing::debug!(seq, query = query.normalized(), ?buckets, "Query waiting on shards");
        let normalized = query.normalized().to_string();
        self.events.send_if_modified(|snapshot| {
            if seq < snapshot.seq {
                return false;
            }
            snapshot.seq = seq;
            snapshot.state = SessionState::Loading;
            snapshot.query = normalized;
            snapshot.error = None;
            true
        });
        Keystroke::Pending(PendingQuery {
            seq,
            query,
            buckets,
        })
    }

    /// Needed buckets that still have to be fetched. Shards the store already
    /// holds are merged on the spot; malformed buckets are never waited on.
    fn unmerged_buckets(&self, query: &Query) -> Vec<Bucket> {
        let mut missing = Vec::new();
        for bucket in query.needed_buckets() {
            if read(&self.index).contains_bucket(bucket) || self.store.is_rejected(bucket) {
                continue;
            }
            match self.store.cached(bucket) {
                Some(shard) => {
                    write(&self.index).add_shard(&shard);
                }
                None => missing.push(bucket),
            }
        }
        missing
    }

    /// Load the shards a pending query needs, then answer it.
    ///
    /// Returns `None` (and publishes nothing) if a newer keystroke was issued
    /// while loading. A failed load still answers, with partial coverage, and
    /// leaves the session [`SessionState::Idle`] with the error attached.
    pub async fn complete(&self, pending: PendingQuery) -> Option<Arc<ResultSet>> {
        let PendingQuery {
            seq,
            query,
            buckets,
        } = pending;

        let loads = futures::future::join_all(
            buckets.iter().map(|&bucket| self.store.ensure_loaded(bucket)),
        )
        .await;

        let mut error = None;
        for loaded in loads {
            match loaded {
                Ok(shard) => {
                    write(&self.index).add_shard(&shard);
                }
                Err(e) => {
                    error.get_or_insert(e);
                }
            }
        }

        if !self.is_latest(seq) {
            tracing::debug!(seq, query = query.normalized(), "Discarding superseded query");
            return None;
        }

        let results = self.compute(&query);
        let state = if error.is_some() {
            SessionState::Idle
        } else {
            SessionState::Ready
        };
        self.publish(seq, state, &query, Arc::clone(&results), error)
            .then_some(results)
    }

    /// [`begin`](Self::begin) followed, if needed, by [`complete`](Self::complete).
    pub async fn input(&self, text: &str) -> Option<Arc<ResultSet>> {
        match self.begin(text) {
            Keystroke::Ready(results) => Some(results),
            Keystroke::Pending(pending) => self.complete(pending).await,
        }
    }

    /// Drive the session from a stream of keystrokes until the channel closes
    /// or `cancel` fires.
    ///
    /// Keystrokes arriving within the debounce window of each other coalesce
    /// and only the last one is issued. Pending loads are polled on this task,
    /// so a slow shard never holds up later keystrokes.
    pub async fn run(&self, mut keystrokes: mpsc::Receiver<String>, cancel: CancellationToken) {
        let mut latest: Option<String> = None;
        let mut closed = false;
        let mut loads = FuturesUnordered::new();
        let quiet = tokio::time::sleep(self.debounce);
        tokio::pin!(quiet);

        loop {
            if closed && latest.is_none() && loads.is_empty() {
                break;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(pending = loads.len(), "Search session cancelled");
                    break;
                }
                key = keystrokes.recv(), if !closed => match key {
                    Some(text) => {
                        latest = Some(text);
                        quiet.as_mut().reset(Instant::now() + self.debounce);
                    }
                    None => {
                        closed = true;
                        if let Some(text) = latest.take()
                            && let Keystroke::Pending(pending) = self.begin(&text)
                        {
                            loads.push(self.complete(pending));
                        }
                    }
                },
                () = &mut quiet, if latest.is_some() => {
                    if let Some(text) = latest.take()
                        && let Keystroke::Pending(pending) = self.begin(&text)
                    {
                        loads.push(self.complete(pending));
                    }
                }
                Some(_) = loads.next(), if !loads.is_empty() => {}
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.events.borrow().clone()
    }

    /// Sequence number of the most recently issued keystroke.
    pub fn latest_seq(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    fn is_latest(&self, seq: u64) -> bool {
        self.latest_seq() == seq
    }

    pub fn loaded_buckets(&self) -> Vec<Bucket> {
        read(&self.index).buckets().collect()
    }

    pub fn entry_count(&self) -> usize {
        read(&self.index).len()
    }

    pub fn generation(&self) -> u64 {
        read(&self.index).generation()
    }

    fn publish(
        &self,
        seq: u64,
        state: SessionState,
        query: &Query,
        results: Arc<ResultSet>,
        error: Option<ShardError>,
    ) -> bool {
        self.events.send_if_modified(|snapshot| {
            if seq < snapshot.seq {
                return false;
            }
            *snapshot = Snapshot {
                seq,
                state,
                query: query.normalized().to_string(),
                results,
                error,
            };
            true
        })
    }
}

fn new_memo(capacity: usize) -> Option<Memo> {
    NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity)))
}
