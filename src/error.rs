//! Error handling types and utilities.

use crate::shard::Bucket;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A specialized Result type for application-level glue (manifest discovery,
/// the server binary).
///
/// This is an alias for `anyhow::Result` with context added via `.context()` and
/// `.with_context()` methods.
pub type Result<T> = anyhow::Result<T>;

/// Failure to make one bucket's shard available.
///
/// Errors are scoped to a single bucket: every other bucket stays usable.
/// `Clone` so one in-flight load can report the same failure to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    /// The source could not deliver the payload (IO or transport failure).
    #[error("shard '{bucket}' is unavailable: {reason}")]
    Unavailable { bucket: Bucket, reason: String },
    /// The source did not deliver the payload within the load timeout.
    #[error("shard '{bucket}' did not load within {after:?}")]
    TimedOut { bucket: Bucket, after: Duration },
    /// The payload violates the wire format.
    #[error("shard '{bucket}' is malformed: {reason}")]
    Malformed { bucket: Bucket, reason: String },
}

impl ShardError {
    pub const fn bucket(&self) -> Bucket {
        match self {
            Self::Unavailable { bucket, .. }
            | Self::TimedOut { bucket, .. }
            | Self::Malformed { bucket, .. } => *bucket,
        }
    }

    /// Transient failures that a later keystroke may retry.
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::TimedOut { .. })
    }
}

/// Error returned when loading the search configuration fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}
