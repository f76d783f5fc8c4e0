//! Where shard payloads come from.

use crate::error::ShardError;
use crate::manifest::Manifest;
use crate::shard::Bucket;
use ahash::AHashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};

/// Payload of a bucket the generator emitted nothing for.
pub const EMPTY_PAYLOAD: &str = "[]";

/// Fetches the raw payload of one bucket's shard.
///
/// Object safe so the store can hold any transport (filesystem, network,
/// test double) behind `Arc<dyn ShardSource>`.
pub trait ShardSource: Send + Sync {
    fn fetch(&self, bucket: Bucket) -> BoxFuture<'static, Result<String, ShardError>>;
}

/// Reads shard files from a generated search directory.
#[derive(Debug, Clone)]
pub struct FsShardSource {
    dir: PathBuf,
    manifest: Manifest,
}

impl FsShardSource {
    pub fn new(dir: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            dir: dir.into(),
            manifest,
        }
    }

    /// Open a search directory, reading its manifest.
    pub async fn open(search_dir: &Path) -> crate::error::Result<Self> {
        let manifest = Manifest::load(search_dir).await?;
        Ok(Self::new(search_dir, manifest))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

impl ShardSource for FsShardSource {
    fn fetch(&self, bucket: Bucket) -> BoxFuture<'static, Result<String, ShardError>> {
        let Some(file) = self.manifest.file_for(bucket) else {
            tracing::debug!(%bucket, "Bucket not in manifest, serving empty shard");
            return futures::future::ready(Ok(EMPTY_PAYLOAD.to_string())).boxed();
        };
        let path = self.dir.join(file);
        async move {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ShardError::Unavailable {
                    bucket,
                    reason: format!("{}: {}", path.display(), e),
                })
        }
        .boxed()
    }
}

/// Serves payloads held in memory. Buckets without a payload are empty.
#[derive(Debug, Clone, Default)]
pub struct MemoryShardSource {
    payloads: AHashMap<Bucket, String>,
}

impl MemoryShardSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_payload(mut self, bucket: impl Into<Bucket>, payload: impl Into<String>) -> Self {
        self.insert(bucket, payload);
        self
    }

    pub fn insert(&mut self, bucket: impl Into<Bucket>, payload: impl Into<String>) {
        self.payloads.insert(bucket.into(), payload.into());
    }
}

impl ShardSource for MemoryShardSource {
    fn fetch(&self, bucket: Bucket) -> BoxFuture<'static, Result<String, ShardError>> {
        let payload = self
            .payloads
            .get(&bucket)
            .cloned()
            .unwrap_or_else(|| EMPTY_PAYLOAD.to_string());
        futures::future::ready(Ok(payload)).boxed()
    }
}
