//! MCP server exposing symbol search over a generated documentation site.

use crate::ranker::{Coverage, ResultGroup, ResultSet};
use crate::session::SearchSession;
use crate::shard::Entry;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_handler, tool_router,
};
use std::fmt::Write as _;
use std::sync::Arc;

/// Parameters for the search_symbols tool
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct SearchSymbolsRequest {
    /// Symbol name or prefix, optionally qualified (`singlepp::train`, `tatami transpose`)
    pub query: String,
    /// Maximum number of result groups (capped by the configured limit)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// MCP server answering symbol queries from one search session
#[derive(Clone)]
pub struct SearchServer {
    session: Arc<SearchSession>,
    /// Prefix for local result links
    site_root: String,
    /// Number of buckets the site's manifest lists
    manifest_buckets: usize,

    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for SearchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchServer")
            .field("session", &self.session)
            .field("site_root", &self.site_root)
            .finish()
    }
}

#[tool_router]
impl SearchServer {
    pub fn new(
        session: Arc<SearchSession>,
        site_root: impl Into<String>,
        manifest_buckets: usize,
    ) -> Self {
        Self {
            session,
            site_root: site_root.into(),
            manifest_buckets,
            tool_router: Self::tool_router(),
        }
    }

    pub const fn session(&self) -> &Arc<SearchSession> {
        &self.session
    }

    #[tool(
        description = "Search documented symbols (classes, functions, namespaces, files) by name prefix. Qualify with a scope to narrow results, e.g. 'singlepp::train' or 'tatami transpose'. Overloads are grouped under one name with one link per declaration."
    )]
    async fn search_symbols(
        &self,
        Parameters(SearchSymbolsRequest { query, limit }): Parameters<SearchSymbolsRequest>,
    ) -> std::result::Result<String, String> {
        let results = match self.session.input(&query).await {
            Some(results) => results,
            // superseded by a concurrent call; answer from what is merged now
            None => self.session.search(&query),
        };
        let results = match limit {
            Some(limit) => Arc::new(results.truncated_to(limit)),
            None => results,
        };
        Ok(format_results(&results, &self.site_root))
    }

    #[tool(description = "Show which index shards are loaded and how many symbols are searchable.")]
    async fn index_status(&self) -> std::result::Result<String, String> {
        let loaded = self.session.loaded_buckets();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Loaded shards: {} of {}",
            loaded.len(),
            self.manifest_buckets
        );
        if !loaded.is_empty() {
            let names: Vec<String> = loaded.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "Buckets: {}", names.join(" "));
        }
        let _ = writeln!(out, "Searchable entries: {}", self.session.entry_count());
        let snapshot = self.session.snapshot();
        if let Some(error) = snapshot.error {
            let _ = writeln!(out, "Last error: {}", error);
        }
        Ok(out)
    }
}

#[tool_handler]
impl ServerHandler for SearchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(
            ServerCapabilities::builder()
                .enable_tools()
                .build(),
        )
        .with_protocol_version(ProtocolVersion::V_2024_11_05)
        .with_server_info(Implementation::from_build_env())
        .with_instructions(
            "doxysearch: prefix search over the symbol index of a generated C++ documentation site. \
             Index shards load on first use, so the first query for a letter may take a moment. \
             Use index_status to see what is loaded.",
        )
    }
}

/// Render a result set as plain text, one group per bullet.
pub fn format_results(results: &ResultSet, site_root: &str) -> String {
    let mut out = String::new();
    if results.query.is_empty() {
        return "Empty query: type a symbol name or prefix.".to_string();
    }

    if results.is_empty() {
        let _ = writeln!(out, "No symbols match '{}'.", results.query);
    } else {
        let _ = writeln!(
            out,
            "Symbols matching '{}' ({} of {}):\n",
            results.query,
            results.len(),
            results.total
        );
        for group in &results.groups {
            write_group(&mut out, group, site_root);
        }
    }

    if results.truncated {
        let _ = writeln!(out, "\n… {} more matches", results.remaining());
    }
    if let Coverage::Partial { missing } = &results.coverage {
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "\nNote: results may be incomplete, index shards not loaded: {}",
            names.join(" ")
        );
    }
    out
}

fn write_group(out: &mut String, group: &ResultGroup, site_root: &str) {
    if let [entry] = group.entries.as_slice() {
        let _ = writeln!(out, "• {}", describe(entry, site_root));
        return;
    }
    let _ = writeln!(
        out,
        "• {} ({} declarations)",
        group.display_name,
        group.entries.len()
    );
    for entry in &group.entries {
        let _ = writeln!(out, "    - {}", describe(entry, site_root));
    }
}

fn describe(entry: &Entry, site_root: &str) -> String {
    let link = entry.target.resolve(site_root);
    match &entry.scope {
        Some(scope) => format!("{} [{}] → {}", entry.display_name, scope, link),
        None => format!("{} → {}", entry.display_name, link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MergedIndex;
    use crate::matcher::{Query, QueryMatcher};
    use crate::ranker::Ranker;
    use crate::shard::{Bucket, Shard};
    use assert2::check;

    const SHARD_T: &str = "var searchData=[
      ['total_4',['total',['https://x/classtatami_1_1Oracle.html#a2',1,'tatami::Oracle'],['../classtatami_1_1Fixed.html#a9',1,'tatami::Fixed']]],
      ['transpose_17',['transpose',['../namespacetatami.html#a4',1,'tatami']]]
    ];";

    fn ranked(text: &str, limit: usize) -> ResultSet {
        let mut index = MergedIndex::new();
        index.add_shard(&Shard::parse(Bucket::new('t'), SHARD_T).unwrap());
        let query = Query::parse(text);
        Ranker::new(limit).rank(QueryMatcher::default().match_query(&index, &query), &query)
    }

    #[test]
    fn renders_groups_with_resolved_links() {
        let out = format_results(&ranked("t", 20), "https://docs.example.org/lib/");
        check!(out.contains("Symbols matching 't' (2 of 2)"));
        check!(out.contains("• total (2 declarations)"));
        check!(out.contains("    - total [tatami::Oracle] → https://x/classtatami_1_1Oracle.html#a2"));
        check!(out.contains("    - total [tatami::Fixed] → https://docs.example.org/lib/classtatami_1_1Fixed.html#a9"));
        check!(out.contains("• transpose [tatami] → https://docs.example.org/lib/namespacetatami.html#a4"));
        check!(!out.contains("more matches"));
    }

    #[test]
    fn reports_truncation_and_partial_coverage() {
        let out = format_results(&ranked("t", 1), "");
        check!(out.contains("… 1 more matches"));

        let query = Query::parse("tr");
        let partial = Ranker::default().rank(
            QueryMatcher::default().match_query(&MergedIndex::new(), &query),
            &query,
        );
        let out = format_results(&partial, "");
        check!(out.contains("No symbols match 'tr'."));
        check!(out.contains("index shards not loaded: t"));
    }
}
