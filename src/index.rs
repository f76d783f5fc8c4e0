//! Merged, key-ordered view over every loaded shard.
//!
//! Entries are kept in one vector sorted by normalized key, so every prefix
//! owns a contiguous run: a prefix lookup is a binary search for the start of
//! the run plus a scan to its end, `O(log n + m)`. Adding a shard merges its
//! (sorted) entries into the existing order in one pass; entries already
//! present keep their relative order, and newcomers sharing a key land after
//! them.

use crate::shard::{Bucket, Entry, Shard};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct MergedIndex {
    entries: Vec<Arc<Entry>>,
    buckets: BTreeSet<Bucket>,
    generation: u64,
}

impl MergedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a shard. Returns `false` (and changes nothing) if a shard for the
    /// same bucket was merged before.
    pub fn add_shard(&mut self, shard: &Shard) -> bool {
        if !self.buckets.insert(shard.bucket()) {
            tracing::trace!(bucket = %shard.bucket(), "Shard already merged");
            return false;
        }

        let mut incoming: Vec<Arc<Entry>> = shard.entries().to_vec();
        incoming.sort_by(|a, b| a.key.cmp(&b.key));

        let existing = std::mem::take(&mut self.entries);
        let mut merged = Vec::with_capacity(existing.len() + incoming.len());
        let mut existing = existing.into_iter().peekable();
        let mut incoming = incoming.into_iter().peekable();

        loop {
            let take_incoming = match (existing.peek(), incoming.peek()) {
                (Some(old), Some(new)) => new.key < old.key,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => break,
            };
            let next = if take_incoming {
                incoming.next()
            } else {
                existing.next()
            };
            merged.extend(next);
        }

        self.entries = merged;
        self.generation += 1;
        tracing::debug!(
            bucket = %shard.bucket(),
            added = shard.len(),
            total = self.entries.len(),
            "Merged shard into index"
        );
        true
    }

    /// Entries whose normalized key equals `key`, in merge order.
    pub fn lookup_exact(&self, key: &str) -> &[Arc<Entry>] {
        let start = self.entries.partition_point(|e| e.key.as_str() < key);
        let len = self.entries[start..].partition_point(|e| e.key == key);
        &self.entries[start..start + len]
    }

    /// Entries whose normalized key starts with `prefix`, in key order.
    pub fn lookup_prefix(&self, prefix: &str) -> &[Arc<Entry>] {
        let start = self.entries.partition_point(|e| e.key.as_str() < prefix);
        let len = self.entries[start..].partition_point(|e| e.key.starts_with(prefix));
        &self.entries[start..start + len]
    }

    pub fn contains_bucket(&self, bucket: Bucket) -> bool {
        self.buckets.contains(&bucket)
    }

    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.buckets.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every successful merge; memoized results key on it.
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}
