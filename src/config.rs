//! Search configuration loaded from TOML.

use crate::error::ConfigError;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DOXYSEARCH_CONFIG";

/// Tunables for a search session. Every field has a default, so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Maximum number of result groups returned.
    pub limit: usize,
    /// Queries shorter than this are still answered, only truncated.
    pub min_query_len: usize,
    /// Quiet period after a keystroke before a query is issued.
    pub debounce_ms: u64,
    /// Upper bound on one shard load.
    pub load_timeout_ms: u64,
    /// Number of memoized result sets.
    pub memo_capacity: usize,
    /// Directory for compiled shards; no caching when unset.
    pub cache_dir: Option<String>,
    /// Prefix for resolved result links.
    pub site_root: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            min_query_len: 2,
            debounce_ms: 120,
            load_timeout_ms: 5000,
            memo_capacity: 64,
            cache_dir: None,
            site_root: String::new(),
        }
    }
}

impl SearchConfig {
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from [`SearchConfig::default_path`] when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_toml_str(&text, &path)
            }
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    /// `<config dir>/doxysearch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("doxysearch").join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Invalid("limit must be at least 1".to_string()));
        }
        if self.load_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "load_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Cache directory with `~` expanded.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_deref()
            .map(|dir| PathBuf::from(expand_tilde(dir).as_ref()))
    }
}

/// Expands tilde (`~`) in a path to the user's home directory.
///
/// - `~/foo` becomes `/home/user/foo`
/// - `~` becomes `/home/user`
/// - Other paths are returned unchanged
pub fn expand_tilde(path: &str) -> Cow<'_, str> {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped).display().to_string());
        }
    } else if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return Cow::Owned(home.display().to_string());
    }
    Cow::Borrowed(path)
}
