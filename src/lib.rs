//! Incremental prefix search over the sharded symbol index of a generated
//! documentation site.
//!
//! Shards are fetched on demand through a [`ShardSource`], merged into one
//! key-ordered [`MergedIndex`], matched by [`QueryMatcher`] and ordered by
//! [`Ranker`]. [`SearchSession`] ties these together for interactive use.

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
mod literal;
pub mod manifest;
pub mod matcher;
pub mod normalize;
pub mod ranker;
pub mod server;
pub mod session;
pub mod shard;
pub mod source;
pub mod store;
pub mod tracing;

pub use cache::ShardCache;
pub use config::SearchConfig;
pub use error::{ConfigError, Result, ShardError};
pub use index::MergedIndex;
pub use manifest::Manifest;
pub use matcher::{MatchOutcome, Query, QueryMatcher};
pub use ranker::{Coverage, Ranker, ResultGroup, ResultSet};
pub use server::SearchServer;
pub use session::{Keystroke, PendingQuery, SearchSession, SessionState, Snapshot};
pub use shard::{Bucket, Entry, Shard, Target};
pub use source::{FsShardSource, MemoryShardSource, ShardSource};
pub use store::ShardStore;
