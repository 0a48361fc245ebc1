pub mod crawl;
pub mod discover;

// Re-export command functions for convenience
pub use crawl::{crawl, stats, CrawlParams};
pub use discover::{discover, fetch};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use pib_crawler::models::{CrawlWindow, PortalGeneration, SearchFilters, SearchMode};

/// Date selection shared by the crawl-style commands
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Single date (YYYY-MM-DD)
    #[arg(short, long, conflicts_with_all = ["from", "to"])]
    pub date: Option<NaiveDate>,

    /// Range start (YYYY-MM-DD, inclusive)
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Range end (YYYY-MM-DD, inclusive)
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
}

impl WindowArgs {
    pub fn window(&self) -> Result<CrawlWindow> {
        match (self.date, self.from, self.to) {
            (Some(date), _, _) => Ok(CrawlWindow::single(date)),
            (None, Some(from), Some(to)) => CrawlWindow::new(from, to)
                .with_context(|| format!("--from {from} is after --to {to}")),
            _ => anyhow::bail!("Specify either --date or --from and --to"),
        }
    }
}

/// Search filters shared by the crawl-style commands
#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Free-text query (legacy portal only)
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// Ministry code, 0 for all
    #[arg(short, long, default_value = "0")]
    pub ministry: u32,

    /// Search type code (1 keyword, 2 date)
    #[arg(long, default_value = "2")]
    pub search_type: u8,
}

impl FilterArgs {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            query: self.query.clone(),
            ministry: self.ministry,
            mode: SearchMode::from_code(self.search_type),
        }
    }
}

pub fn parse_portal(s: &str) -> Result<PortalGeneration> {
    PortalGeneration::parse(s)
        .with_context(|| format!("Unknown portal: {s}. Valid: legacy, modern"))
}
