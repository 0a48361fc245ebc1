use anyhow::{Context, Result};
use std::sync::Arc;

use pib_crawler::config::Config;
use pib_crawler::crawler::discovery::discovery_for;
use pib_crawler::crawler::fetcher::{DetailFetcher, DocumentFetcher};
use pib_crawler::crawler::PortalClient;
use pib_crawler::models::DocumentId;
use pib_crawler::parser::{Extractor, ReleaseExtractor};

use super::{parse_portal, FilterArgs, WindowArgs};

pub async fn discover(
    config: Config,
    window: WindowArgs,
    filters: FilterArgs,
    portal: String,
) -> Result<()> {
    let window = window.window()?;
    let portal = parse_portal(&portal)?;
    let client = Arc::new(PortalClient::new(&config).context("Failed to create HTTP client")?);

    let discovery = discovery_for(portal, client);
    discovery
        .preflight()
        .await
        .context("Portal preflight failed")?;

    let result = discovery
        .discover(&window, &filters.filters())
        .await
        .with_context(|| format!("Discovery failed for {} to {}", window.start, window.end))?;

    for id in result.ids() {
        println!("{id}");
    }
    eprintln!(
        "Found {} {} identifiers between {} and {}",
        result.len(),
        portal,
        window.start,
        window.end
    );

    Ok(())
}

pub async fn fetch(config: Config, prid: String, portal: String) -> Result<()> {
    let portal = parse_portal(&portal)?;
    let client = Arc::new(PortalClient::new(&config).context("Failed to create HTTP client")?);

    let id = DocumentId::new(portal, prid);
    let raw = DetailFetcher::new(client).fetch(&id).await?;
    let record = ReleaseExtractor::new().extract_checked(&raw)?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
