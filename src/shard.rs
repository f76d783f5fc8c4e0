//! Typed index shards and the validating parse from the generator's payload.

use crate::error::ShardError;
use crate::literal;
use crate::normalize::{decode_key, normalize, plain_label};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Partition key of the index: the leading character of a normalized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket(char);

impl Bucket {
    /// Bucket for a character, folded to lower case.
    pub fn new(c: char) -> Self {
        Self(c.to_lowercase().next().unwrap_or(c))
    }

    /// Bucket holding keys that start like `normalized`, or `None` for empty text.
    pub fn of(normalized: &str) -> Option<Self> {
        normalized.chars().next().map(Self::new)
    }

    pub const fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<char> for Bucket {
    fn from(c: char) -> Self {
        Self::new(c)
    }
}

/// Where a search hit links to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Page of an externally hosted reference (tag-file import).
    External { url: String },
    /// Page of the local site, relative to the generator's search directory.
    Local {
        path: String,
        anchor: Option<String>,
    },
}

impl Target {
    pub fn parse(href: &str) -> Self {
        if href.starts_with("http://") || href.starts_with("https://") {
            return Self::External {
                url: href.to_string(),
            };
        }
        match href.split_once('#') {
            Some((path, anchor)) => Self::Local {
                path: path.to_string(),
                anchor: (!anchor.is_empty()).then(|| anchor.to_string()),
            },
            None => Self::Local {
                path: href.to_string(),
                anchor: None,
            },
        }
    }

    pub const fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }

    /// Resolve to a link usable from the site root `base` (`""` for a
    /// root-relative link, or e.g. `https://docs.example.org/lib/`).
    ///
    /// External targets are returned unchanged. Local paths lose the leading
    /// `../` segments that make them relative to the search directory.
    pub fn resolve(&self, base: &str) -> String {
        match self {
            Self::External { url } => url.clone(),
            Self::Local { path, anchor } => {
                let mut relative = path.as_str();
                while let Some(rest) = relative.strip_prefix("../") {
                    relative = rest;
                }
                let mut link = String::with_capacity(base.len() + relative.len() + 1);
                link.push_str(base);
                if !base.is_empty() && !base.ends_with('/') && !relative.is_empty() {
                    link.push('/');
                }
                link.push_str(relative);
                if let Some(anchor) = anchor {
                    link.push('#');
                    link.push_str(anchor);
                }
                link
            }
        }
    }
}

/// One indexed symbol occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Normalized search key (`train_integrated`). Shared by overloads.
    pub key: String,
    /// Generator key including the per-shard disambiguator (`train_5fintegrated_5`).
    pub raw_key: String,
    /// Label shown in results, entities decoded.
    pub display_name: String,
    /// Enclosing namespace or class (`singlepp`, `tatami::Oracle`).
    pub scope: Option<String>,
    /// Normalized form of `scope`, used for scope-qualified matching.
    pub scope_key: Option<String>,
    /// Scope label as emitted, possibly carrying markup.
    pub scope_label: Option<String>,
    pub target: Target,
    /// Whether the link opens in the current frame rather than a new window.
    pub same_window: bool,
}

/// Immutable, parsed slice of the index holding every key in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    bucket: Bucket,
    /// Shared with the merged index, which holds the same allocations.
    entries: Vec<Arc<Entry>>,
}

impl Shard {
    /// Build a shard from already validated entries.
    pub fn new(bucket: Bucket, entries: Vec<Entry>) -> Self {
        Self {
            bucket,
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub const fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse and validate a shard payload for `bucket`.
    ///
    /// Records that violate the wire format are skipped with a warning. The
    /// shard as a whole is rejected if the payload is not an array literal or
    /// if a raw key repeats.
    pub fn parse(bucket: Bucket, payload: &str) -> Result<Self, ShardError> {
        let value = literal::parse_script(payload).map_err(|e| ShardError::Malformed {
            bucket,
            reason: e.to_string(),
        })?;
        let Value::Array(records) = value else {
            return Err(ShardError::Malformed {
                bucket,
                reason: "top-level value is not an array".to_string(),
            });
        };

        let mut seen = AHashSet::with_capacity(records.len());
        let mut entries = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for (position, record) in records.iter().enumerate() {
            match parse_record(bucket, record) {
                Ok(record_entries) => {
                    let raw_key = &record_entries[0].raw_key;
                    if !seen.insert(raw_key.clone()) {
                        return Err(ShardError::Malformed {
                            bucket,
                            reason: format!("duplicate key '{}'", raw_key),
                        });
                    }
                    entries.extend(record_entries.into_iter().map(Arc::new));
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(%bucket, position, "Skipping malformed index record: {}", e);
                }
            }
        }

        tracing::debug!(
            %bucket,
            entries = entries.len(),
            skipped,
            "Parsed shard with {} records",
            records.len()
        );

        Ok(Self { bucket, entries })
    }
}

#[derive(Debug, Error)]
enum RecordError {
    #[error("record is not a [key, [label, occurrences...]] pair")]
    Shape,
    #[error("key '{0}' has an invalid escape sequence")]
    BadKey(String),
    #[error("key '{key}' does not belong to bucket '{bucket}'")]
    WrongBucket { key: String, bucket: Bucket },
    #[error("key '{0}' has no occurrences")]
    NoOccurrences(String),
    #[error("occurrence {0} is not a [href, flag, scope] triple")]
    Occurrence(usize),
}

/// `[rawKey, [displayName, [href, flag, scope], ...]]` → one entry per occurrence.
fn parse_record(bucket: Bucket, record: &Value) -> Result<Vec<Entry>, RecordError> {
    let [Value::String(raw_key), Value::Array(body)] =
        record.as_array().map(Vec::as_slice).unwrap_or_default()
    else {
        return Err(RecordError::Shape);
    };
    let Some((Value::String(label), occurrences)) = body.split_first() else {
        return Err(RecordError::Shape);
    };

    let key = decode_key(raw_key).ok_or_else(|| RecordError::BadKey(raw_key.clone()))?;
    if Bucket::of(&key) != Some(bucket) {
        return Err(RecordError::WrongBucket {
            key: raw_key.clone(),
            bucket,
        });
    }
    if occurrences.is_empty() {
        return Err(RecordError::NoOccurrences(raw_key.clone()));
    }

    let display_name = plain_label(label);
    occurrences
        .iter()
        .enumerate()
        .map(|(i, occurrence)| {
            let (href, same_window, scope_label) =
                parse_occurrence(occurrence).ok_or(RecordError::Occurrence(i))?;
            let scope = scope_label.and_then(|label| derive_scope(label, &display_name));
            Ok(Entry {
                key: key.clone(),
                raw_key: raw_key.clone(),
                display_name: display_name.clone(),
                scope_key: scope.as_deref().map(normalize),
                scope,
                scope_label: scope_label
                    .filter(|label| !label.is_empty())
                    .map(str::to_string),
                target: Target::parse(href),
                same_window,
            })
        })
        .collect()
}

/// Accepts `[href]`, `[href, flag]`, `[href, scope]` and `[href, flag, scope]`.
fn parse_occurrence(value: &Value) -> Option<(&str, bool, Option<&str>)> {
    let items = value.as_array()?;
    let href = items.first()?.as_str()?;
    match &items[1..] {
        [] => Some((href, true, None)),
        [Value::Number(flag)] => Some((href, flag.as_i64()? != 0, None)),
        [Value::String(scope)] => Some((href, true, Some(scope.as_str()))),
        [Value::Number(flag), Value::String(scope)] => {
            Some((href, flag.as_i64()? != 0, Some(scope.as_str())))
        }
        _ => None,
    }
}

/// Reduce a scope label to the enclosing scope of `display_name`.
///
/// `tatami::Oracle::total()` for `total` yields `tatami::Oracle`;
/// `singlepp::train_integrated(const std::vector&lt; ... &gt; &amp;inputs)`
/// yields `singlepp`; a bare `singlepp` is already the scope.
fn derive_scope(label: &str, display_name: &str) -> Option<String> {
    let plain = plain_label(label);
    let head = plain.split('(').next().unwrap_or_default().trim();
    if head.is_empty() {
        return None;
    }
    let mut segments: Vec<&str> = head.split("::").map(str::trim).collect();
    if segments
        .last()
        .is_some_and(|last| last.eq_ignore_ascii_case(display_name.trim()))
    {
        segments.pop();
    }
    let scope = segments.join("::");
    (!scope.is_empty()).then_some(scope)
}
