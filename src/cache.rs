//! Compiled shard cache.
//!
//! Parsed shards are written with `postcard` under a file name derived from the
//! bucket and the xxh3 digest of the payload they were parsed from. A changed
//! payload hashes differently, so stale files are simply never read again.
//! Cache failures are logged and otherwise ignored.

use crate::shard::{Bucket, Shard};
use postcard::{from_io, to_io};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct ShardCache {
    dir: PathBuf,
}

impl ShardCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Digest identifying one payload revision.
    pub fn digest(payload: &str) -> u64 {
        xxh3_64(payload.as_bytes())
    }

    fn path_for(&self, bucket: Bucket, digest: u64) -> PathBuf {
        self.dir
            .join(format!("{:04x}-{:016x}.shard", u32::from(bucket.as_char()), digest))
    }

    /// Load the shard compiled from the payload with `digest`, if cached.
    pub async fn load(&self, bucket: Bucket, digest: u64) -> Option<Shard> {
        let path = self.path_for(bucket, digest);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return None;
        }

        // Deserialize in spawn_blocking since it's CPU intensive
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path).ok()?;
            let mut buf = [0u8; 8192];
            match from_io::<Shard, _>((&mut file, &mut buf)) {
                Ok((shard, _)) if shard.bucket() == bucket => {
                    tracing::debug!(%bucket, "Using cached shard {}", path.display());
                    Some(shard)
                }
                Ok(_) => {
                    tracing::warn!(%bucket, "Cached shard {} belongs to another bucket", path.display());
                    None
                }
                Err(e) => {
                    tracing::warn!("Failed to deserialize cached shard at {}: {}", path.display(), e);
                    let _ = std::fs::remove_file(&path);
                    None
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Store a parsed shard under the digest of its payload.
    pub async fn store(&self, shard: &Shard, digest: u64) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!("Failed to create cache directory {}: {}", self.dir.display(), e);
            return;
        }
        let path = self.path_for(shard.bucket(), digest);
        let shard = shard.clone();

        // Serialize in spawn_blocking since it's CPU intensive
        let task = tokio::task::spawn_blocking(move || {
            match std::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)
            {
                Ok(mut file) => {
                    if let Err(e) = to_io(&shard, &mut file) {
                        tracing::warn!("Failed to write cached shard to {}: {}", path.display(), e);
                        let _ = std::fs::remove_file(&path);
                    } else {
                        tracing::debug!(bucket = %shard.bucket(), "Cached shard to {}", path.display());
                    }
                }
                Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => {
                    tracing::warn!("Failed to create cache file {}: {}", path.display(), e);
                }
                _ => {
                    // Already exists, another process may have created it
                    tracing::debug!("Cache file already exists at {}", path.display());
                }
            }
        });
        if let Err(e) = task.await {
            tracing::warn!("Shard cache write task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};

    const PAYLOAD: &str = "var searchData=[['top_3',['top',['../a.html#x',1,'singlepp::TrainSingleOptions']]]];";

    #[tokio::test]
    async fn stores_and_reloads_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShardCache::new(dir.path().join("shards"));
        let bucket = Bucket::new('t');
        let shard = Shard::parse(bucket, PAYLOAD).unwrap();
        let digest = ShardCache::digest(PAYLOAD);

        check!(cache.load(bucket, digest).await.is_none());
        cache.store(&shard, digest).await;

        let_assert!(Some(cached) = cache.load(bucket, digest).await);
        check!(cached == shard);
        check!(cache.load(bucket, ShardCache::digest("[]")).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ShardCache::new(dir.path());
        let bucket = Bucket::new('t');
        let digest = ShardCache::digest(PAYLOAD);
        std::fs::write(cache.path_for(bucket, digest), b"\xff\xff\xff").unwrap();

        check!(cache.load(bucket, digest).await.is_none());
    }
}
