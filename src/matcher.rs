//! Query parsing and prefix matching against the merged index.

use crate::index::MergedIndex;
use crate::normalize::normalize;
use crate::shard::{Bucket, Entry};
use ahash::AHashSet;
use std::sync::Arc;

/// A parsed, normalized query.
///
/// - `tra` → name `tra`, no scope
/// - `singlepp::train` → scope `singlepp`, name `train`
/// - `singlepp train` → scope `singlepp`, name `train`
/// - `tatami::oracle::total` → scope `tatami::oracle`, name `total`
///
/// A qualified query also matches keys that embed the qualifier literally
/// (`tatami::somenumericarray`), so [`Query::qualified`] keeps the joined form.
/// A qualifier split off at a space is only a guess: keys may contain spaces
/// (`operator new`), so such queries also match their whole text as a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    normalized: String,
    scope: Option<String>,
    name: String,
    spaced: bool,
}

impl Query {
    pub fn parse(text: &str) -> Self {
        let normalized = normalize(text);

        let (scope, name, spaced) = if let Some((scope, name)) = normalized.rsplit_once("::") {
            (scope.trim(), name.trim(), false)
        } else if let Some((scope, name)) = normalized.rsplit_once(' ') {
            (scope.trim(), name.trim(), true)
        } else {
            ("", normalized.as_str(), false)
        };

        let (scope, name) = match (scope.is_empty(), name.is_empty()) {
            (false, false) => (
                Some(scope.split_whitespace().collect::<Vec<_>>().join("::")),
                name.to_string(),
            ),
            // `::total` is an unqualified `total`
            (true, false) => (None, name.to_string()),
            // `singlepp::` only matches keys that spell the qualifier out
            (_, true) => (None, normalized.clone()),
        };

        let spaced = spaced && scope.is_some();
        Self {
            normalized,
            scope,
            name,
            spaced,
        }
    }

    /// The query text after normalization.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Prefix matched against entry keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `scope::name` for qualified queries.
    pub fn qualified(&self) -> Option<String> {
        self.scope
            .as_ref()
            .map(|scope| format!("{}::{}", scope, self.name))
    }

    /// The whole text as one prefix, for queries whose qualifier came from a
    /// space rather than `::`.
    pub fn unqualified_prefix(&self) -> Option<&str> {
        self.spaced.then_some(self.normalized.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Length in characters of the normalized text.
    pub fn len(&self) -> usize {
        self.normalized.chars().count()
    }

    /// Buckets whose shards must be merged before this query is fully answered.
    pub fn needed_buckets(&self) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = Bucket::of(&self.name)
            .into_iter()
            .chain(self.qualified().as_deref().and_then(Bucket::of))
            .chain(self.unqualified_prefix().and_then(Bucket::of))
            .collect();
        buckets.sort_unstable();
        buckets.dedup();
        buckets
    }
}

/// Entries matching one query, plus the buckets the answer is still missing.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub entries: Vec<Arc<Entry>>,
    /// Needed buckets that were not merged at match time.
    pub missing: Vec<Bucket>,
}

/// Filters the merged index by a query's prefix (and scope qualifier).
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    min_query_len: usize,
}

impl Default for QueryMatcher {
    fn default() -> Self {
        Self::new(2)
    }
}

impl QueryMatcher {
    /// `min_query_len` marks queries short enough to produce very large runs;
    /// they are still answered and rely on the ranker's truncation.
    pub const fn new(min_query_len: usize) -> Self {
        Self { min_query_len }
    }

    pub const fn min_query_len(&self) -> usize {
        self.min_query_len
    }

    /// Match `query` against whatever is merged. Buckets the query needs that
    /// are not merged are listed in [`MatchOutcome::missing`] rather than
    /// silently producing an empty answer.
    pub fn match_query(&self, index: &MergedIndex, query: &Query) -> MatchOutcome {
        if query.is_empty() {
            return MatchOutcome::default();
        }
        if query.len() < self.min_query_len {
            tracing::trace!(
                query = query.normalized(),
                "Short query, relying on result truncation"
            );
        }

        let missing: Vec<Bucket> = query
            .needed_buckets()
            .into_iter()
            .filter(|bucket| !index.contains_bucket(*bucket))
            .collect();

        let entries = match (query.scope(), query.qualified()) {
            (Some(scope), Some(qualified)) => {
                let mut seen = AHashSet::new();
                let scoped = index.lookup_prefix(query.name()).iter().filter(|entry| {
                    entry
                        .scope_key
                        .as_deref()
                        .is_some_and(|s| s.starts_with(scope))
                });
                let literal = index.lookup_prefix(&qualified).iter();
                let whole = query
                    .unqualified_prefix()
                    .map(|prefix| index.lookup_prefix(prefix))
                    .unwrap_or_default()
                    .iter();
                scoped
                    .chain(literal)
                    .chain(whole)
                    .filter(|entry| seen.insert(Arc::as_ptr(entry)))
                    .cloned()
                    .collect()
            }
            _ => index.lookup_prefix(query.name()).to_vec(),
        };

        MatchOutcome { entries, missing }
    }
}
