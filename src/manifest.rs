//! Bucket → shard file table read from the generator's `searchdata.js`.
//!
//! The generator lists, per index section, the leading characters it emitted
//! shards for. Character `i` of section 0 (`all`) is served by `all_<i>.js`,
//! with `i` in lowercase hex.

use crate::error::Result;
use crate::literal;
use crate::shard::Bucket;
use anyhow::{Context, anyhow};
use ignore::WalkBuilder;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the manifest script inside the search directory.
pub const MANIFEST_FILE: &str = "searchdata.js";

const SECTIONS_VAR: &str = "indexSectionsWithContent";
const NAMES_VAR: &str = "indexSectionNames";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    files: BTreeMap<Bucket, String>,
}

impl Manifest {
    /// Build a manifest from an explicit bucket → file table.
    pub fn from_files(files: impl IntoIterator<Item = (Bucket, String)>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    /// Parse the contents of `searchdata.js`.
    pub fn parse(text: &str) -> Result<Self> {
        let vars = literal::parse_assignments(text).context("Failed to read manifest script")?;

        let sections = vars
            .get(SECTIONS_VAR)
            .ok_or_else(|| anyhow!("manifest has no {}", SECTIONS_VAR))?;
        let Some(Value::String(chars)) = sections.get("0") else {
            anyhow::bail!("manifest section 0 is missing or not a string");
        };
        let name = vars
            .get(NAMES_VAR)
            .and_then(|names| names.get("0"))
            .and_then(Value::as_str)
            .unwrap_or("all");

        let mut files = BTreeMap::new();
        for (i, c) in chars.chars().enumerate() {
            files
                .entry(Bucket::new(c))
                .or_insert_with(|| format!("{}_{:x}.js", name, i));
        }
        tracing::debug!(buckets = files.len(), "Parsed shard manifest");
        Ok(Self { files })
    }

    /// Read `searchdata.js` from a search directory.
    pub async fn load(search_dir: &Path) -> Result<Self> {
        let path = search_dir.join(MANIFEST_FILE);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Find the search directory of a generated documentation tree.
    ///
    /// `root` may be the search directory itself, the HTML output directory,
    /// or any ancestor of it. The shallowest `searchdata.js` wins.
    pub async fn discover(root: &Path) -> Result<PathBuf> {
        if root.join(MANIFEST_FILE).is_file() {
            return Ok(root.to_path_buf());
        }
        let root = root.to_path_buf();
        let found = tokio::task::spawn_blocking(move || {
            WalkBuilder::new(&root)
                .hidden(false)
                .build()
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.file_type().is_some_and(|t| t.is_file())
                        && e.file_name() == MANIFEST_FILE
                })
                .min_by_key(|e| e.depth())
                .and_then(|e| e.path().parent().map(Path::to_path_buf))
                .ok_or_else(|| anyhow!("no {} under {}", MANIFEST_FILE, root.display()))
        })
        .await
        .context("Manifest discovery task panicked")??;
        tracing::info!("Found search index at {}", found.display());
        Ok(found)
    }

    /// Shard file serving `bucket`, or `None` if the generator emitted no
    /// keys starting with that character.
    pub fn file_for(&self, bucket: Bucket) -> Option<&str> {
        self.files.get(&bucket).map(String::as_str)
    }

    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        self.files.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};
    use rstest::rstest;

    const SEARCHDATA: &str = r#"var indexSectionsWithContent =
{
  0: "_abcdefghiklmnoprstuvw~",
  1: "fmst",
  2: "st"
};

var indexSectionNames =
{
  0: "all",
  1: "classes",
  2: "namespaces"
};

var indexSectionLabels =
{
  0: "All",
  1: "Classes",
  2: "Namespaces"
};
"#;

    #[rstest]
    #[case('_', Some("all_0.js"))]
    #[case('a', Some("all_1.js"))]
    #[case('k', Some("all_a.js"))]
    #[case('t', Some("all_12.js"))]
    #[case('~', Some("all_16.js"))]
    #[case('j', None)]
    #[case('T', Some("all_12.js"))]
    fn maps_buckets_to_hex_numbered_files(#[case] c: char, #[case] file: Option<&str>) {
        let_assert!(Ok(manifest) = Manifest::parse(SEARCHDATA));
        check!(manifest.len() == 23);
        check!(manifest.file_for(Bucket::new(c)) == file);
    }

    #[test]
    fn rejects_scripts_without_sections() {
        check!(Manifest::parse("var indexSectionNames = { 0: 'all' };").is_err());
        check!(Manifest::parse("var indexSectionsWithContent = { 0: 3 };").is_err());
        check!(Manifest::parse("garbage").is_err());
    }

    #[tokio::test]
    async fn discovers_nested_search_directory() {
        let dir = tempfile::tempdir().unwrap();
        let search = dir.path().join("docs").join("search");
        std::fs::create_dir_all(&search).unwrap();
        std::fs::write(search.join(MANIFEST_FILE), SEARCHDATA).unwrap();

        let_assert!(Ok(found) = Manifest::discover(dir.path()).await);
        check!(found == search);
        let_assert!(Ok(manifest) = Manifest::load(&found).await);
        check!(manifest.file_for(Bucket::new('t')) == Some("all_12.js"));

        let empty = tempfile::tempdir().unwrap();
        check!(Manifest::discover(empty.path()).await.is_err());
    }
}
