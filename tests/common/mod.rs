//! Shared test fixtures and utilities for integration tests.
//!
//! # Available Fixtures
//!
//! - `site`: a temporary documentation tree holding the fixture search
//!   directory (`html/search/searchdata.js` and the real `all_12.js` shard)
//! - `gated`: an in-memory shard source whose fetches block until the test
//!   opens the bucket's gate, for driving load ordering and timeouts
//!
//! The fixture manifest lists 23 buckets but only `t` has a shard file, so
//! every other listed bucket is unavailable from the filesystem source.

use doxysearch::{Bucket, MemoryShardSource, ShardError, ShardSource};
use futures::FutureExt;
use futures::future::BoxFuture;
use rstest::fixture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Returns the project root directory (where Cargo.toml lives).
pub fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// The checked-in search directory.
pub fn fixture_search_dir() -> PathBuf {
    project_root().join("tests").join("fixtures").join("search")
}

/// Payload of the generator's `t` shard.
pub fn shard_t() -> String {
    std::fs::read_to_string(fixture_search_dir().join("all_12.js"))
        .expect("Failed to read fixture shard")
}

/// A temporary documentation tree with the fixture search directory copied in.
#[allow(dead_code)] // Methods used across different integration test crates
pub struct Site {
    _temp: TempDir,
    root: PathBuf,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl Site {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = temp.path().to_path_buf();
        let site = Self { _temp: temp, root };
        for file in ["searchdata.js", "all_12.js"] {
            site.copy_file(&fixture_search_dir().join(file), &format!("html/search/{}", file));
        }
        site
    }

    /// Root of the tree (an ancestor of the search directory).
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn search_dir(&self) -> PathBuf {
        self.root.join("html").join("search")
    }

    /// Creates a file with the given content, creating parent directories.
    ///
    /// # Panics
    /// Panics if file creation fails.
    pub fn create_file(&self, path: &str, content: &str) {
        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("Failed to create parent directory for '{}': {}", path, e)
            });
        }
        std::fs::write(&full_path, content)
            .unwrap_or_else(|e| panic!("Failed to write file '{}': {}", path, e));
    }

    /// Copies a file from the real filesystem into this tree.
    ///
    /// # Panics
    /// Panics if copying fails.
    pub fn copy_file(&self, source: &Path, dest_relative: &str) {
        let dest = self.root.join(dest_relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!(
                    "Failed to create parent directory for '{}': {}",
                    dest_relative, e
                )
            });
        }
        std::fs::copy(source, &dest).unwrap_or_else(|e| {
            panic!(
                "Failed to copy '{}' to '{}': {}",
                source.display(),
                dest_relative,
                e
            )
        });
    }
}

impl Default for Site {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
#[fixture]
pub fn site() -> Site {
    Site::new()
}

/// In-memory shards behind per-bucket gates.
///
/// A fetch for a gated bucket waits until [`GatedSource::open`] is called for
/// it; ungated buckets answer immediately. Fetches are counted.
#[allow(dead_code)] // Methods used across different integration test crates
pub struct GatedSource {
    inner: MemoryShardSource,
    gates: HashMap<Bucket, Arc<Semaphore>>,
    fetches: Arc<AtomicUsize>,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl GatedSource {
    pub fn new(inner: MemoryShardSource) -> Self {
        Self {
            inner,
            gates: HashMap::new(),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hold fetches for `bucket` until opened.
    #[must_use]
    pub fn gate(mut self, bucket: char) -> Self {
        self.gates
            .insert(Bucket::new(bucket), Arc::new(Semaphore::new(0)));
        self
    }

    /// Release every current and future fetch for `bucket`.
    pub fn open(&self, bucket: char) {
        // closing fails every pending and future acquire
        if let Some(gate) = self.gates.get(&Bucket::new(bucket)) {
            gate.close();
        }
    }

    /// Shared fetch counter; stays valid after the source is moved into a store.
    pub fn fetches(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

impl ShardSource for GatedSource {
    fn fetch(&self, bucket: Bucket) -> BoxFuture<'static, Result<String, ShardError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let payload = self.inner.fetch(bucket);
        let gate = self.gates.get(&bucket).cloned();
        async move {
            if let Some(gate) = gate {
                let _ = gate.acquire().await;
            }
            payload.await
        }
        .boxed()
    }
}

/// Gated source serving the fixture `t` shard and a small `s` shard, both gated.
#[allow(dead_code)]
#[fixture]
pub fn gated() -> GatedSource {
    let inner = MemoryShardSource::new()
        .with_payload('t', shard_t())
        .with_payload(
            's',
            "var searchData=[['singlepp_0',['singlepp',['../namespacesinglepp.html',1,'']]]];",
        );
    GatedSource::new(inner).gate('t').gate('s')
}
