use anyhow::Context;
use doxysearch::config::CONFIG_ENV;
use doxysearch::{FsShardSource, Manifest, SearchConfig, SearchServer, SearchSession};
use rmcp::{ServiceExt, transport::stdio};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable naming the documentation directory.
const DOCS_ENV: &str = "DOXYSEARCH_DOCS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr to avoid interfering with MCP protocol on stdout
    doxysearch::tracing::init();

    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = SearchConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let docs = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(DOCS_ENV))
        .map(PathBuf::from)
        .with_context(|| {
            format!(
                "No documentation directory given. Pass it as the first argument or set {}",
                DOCS_ENV
            )
        })?;

    let search_dir = Manifest::discover(&docs).await?;
    let source = FsShardSource::open(&search_dir).await?;
    let manifest_buckets = source.manifest().len();
    tracing::info!(
        buckets = manifest_buckets,
        "Serving symbol search for {}",
        search_dir.display()
    );

    let session = Arc::new(SearchSession::from_config(Arc::new(source), &config));
    let server = SearchServer::new(session, config.site_root.clone(), manifest_buckets);

    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("Error serving MCP server: {:?}", e);
    })?;

    // Wait for the service to complete
    service.waiting().await?;

    Ok(())
}
