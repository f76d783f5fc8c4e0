//! Result ordering, grouping and truncation.
//!
//! Matches are grouped by normalized key (overloads of one name become a
//! single result with several links) and the groups are ordered by, in
//! priority order:
//!
//! 1. exact key matches before prefix-only matches
//! 2. shorter display names before longer ones
//! 3. groups whose scope matches the query's qualifier before the rest
//! 4. lexical key order, which makes the output deterministic

use crate::matcher::{MatchOutcome, Query};
use crate::shard::{Bucket, Entry};
use ahash::AHashMap;
use std::cmp::Ordering;
use std::sync::Arc;

/// Entries sharing one key, rendered as one logical result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultGroup {
    pub key: String,
    pub display_name: String,
    /// Member entries in merge order. Never empty.
    pub entries: Vec<Arc<Entry>>,
    pub exact: bool,
    pub scope_matched: bool,
}

impl ResultGroup {
    fn display_len(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.display_name.chars().count())
            .min()
            .unwrap_or(0)
    }
}

/// Whether every bucket the query needed contributed to the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Coverage {
    #[default]
    Complete,
    /// Entries from these buckets are absent (loading, unavailable or malformed).
    Partial { missing: Vec<Bucket> },
}

/// Ranked answer to one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Normalized query text the result answers.
    pub query: String,
    /// Visible groups, at most the ranker's limit.
    pub groups: Vec<ResultGroup>,
    /// Number of groups before truncation.
    pub total: usize,
    pub truncated: bool,
    pub coverage: Coverage,
}

impl ResultSet {
    /// The answer to an empty query: no results, not truncated, total 0.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups hidden by truncation ("N more matches").
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.groups.len())
    }

    /// Narrow to at most `limit` groups, keeping the true total.
    #[must_use]
    pub fn truncated_to(&self, limit: usize) -> Self {
        let limit = limit.max(1);
        if self.groups.len() <= limit {
            return self.clone();
        }
        Self {
            groups: self.groups[..limit].to_vec(),
            truncated: true,
            ..self.clone()
        }
    }

    pub const fn is_partial(&self) -> bool {
        matches!(self.coverage, Coverage::Partial { .. })
    }

    /// Visible `(entry, matched key)` pairs in display order.
    pub fn entries(&self) -> impl Iterator<Item = (&Entry, &str)> {
        self.groups.iter().flat_map(|group| {
            group
                .entries
                .iter()
                .map(move |entry| (entry.as_ref(), group.key.as_str()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Ranker {
    limit: usize,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Ranker {
    /// `limit` caps the number of visible groups; it is at least one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub fn rank(&self, outcome: MatchOutcome, query: &Query) -> ResultSet {
        let MatchOutcome { entries, missing } = outcome;
        let coverage = if missing.is_empty() {
            Coverage::Complete
        } else {
            Coverage::Partial { missing }
        };

        let exact_keys = [
            Some(query.name().to_string()),
            query.qualified(),
            query.unqualified_prefix().map(str::to_string),
        ];
        let scope = query.scope();

        let mut positions: AHashMap<String, usize> = AHashMap::new();
        let mut groups: Vec<ResultGroup> = Vec::new();
        for entry in entries {
            let entry_scope_matches = scope.is_some_and(|scope| {
                entry
                    .scope_key
                    .as_deref()
                    .is_some_and(|s| s.starts_with(scope))
            });
            if let Some(&at) = positions.get(&entry.key) {
                let group = &mut groups[at];
                group.scope_matched |= entry_scope_matches;
                group.entries.push(entry);
                continue;
            }
            positions.insert(entry.key.clone(), groups.len());
            groups.push(ResultGroup {
                key: entry.key.clone(),
                display_name: entry.display_name.clone(),
                exact: exact_keys
                    .iter()
                    .flatten()
                    .any(|exact| *exact == entry.key),
                scope_matched: entry_scope_matches,
                entries: vec![entry],
            });
        }

        groups.sort_by(compare_groups);

        let total = groups.len();
        let truncated = total > self.limit;
        groups.truncate(self.limit);

        ResultSet {
            query: query.normalized().to_string(),
            groups,
            total,
            truncated,
            coverage,
        }
    }
}

fn compare_groups(a: &ResultGroup, b: &ResultGroup) -> Ordering {
    b.exact
        .cmp(&a.exact)
        .then_with(|| a.display_len().cmp(&b.display_len()))
        .then_with(|| b.scope_matched.cmp(&a.scope_matched))
        .then_with(|| a.key.cmp(&b.key))
}
