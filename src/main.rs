use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

mod config;
mod enrich;
mod export;
mod extract;
mod fetcher;
mod models;
mod store;

use config::{RenderConfig, SiteConfig, StoreConfig, SummaryConfig};
use enrich::{cached_or_local, Summarizer, SummaryCache};
use extract::DetailParser;
use fetcher::{extract_detail_links, PageFetcher};
use models::{is_sold, Category, Mode, ScrapedListing};
use store::{sync_category, AirtableStore};

const CONFIG_PATH: &str = "src/configs/msi.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let mode = Mode::parse(env::args().nth(1))?;
    info!("🚀 Starting listing scrape and sync (mode: {:?})", mode);

    let site_config = if Path::new(CONFIG_PATH).exists() {
        SiteConfig::from_file(CONFIG_PATH).context("Failed to load site configuration")?
    } else {
        info!("Config file {} not found, using built-in defaults", CONFIG_PATH);
        SiteConfig::default()
    };
    let render_config = RenderConfig::from_env();
    let store_config = StoreConfig::from_env()?;

    let mut fetcher =
        PageFetcher::new(&site_config.scraping, &site_config.selectors, &render_config)?;
    let parser = DetailParser::new(&site_config)?;

    let listings = scrape_listings(&site_config, &mut fetcher, &parser).await?;
    if listings.is_empty() {
        warn!("No listings scraped, leaving the remote store untouched");
        return Ok(());
    }
    info!("Scraped {} listings in total", listings.len());

    let export_dir = export::write_exports(&listings, Path::new("exports"))?;
    info!("CSV exports written to {}", export_dir.display());

    let Some(store_config) = store_config else {
        info!("Store credentials not configured, skipping remote sync");
        return Ok(());
    };
    let strict_keys = store_config.strict_keys;
    let store = AirtableStore::new(store_config)?;

    let summarizer = match SummaryConfig::from_env() {
        Some(cfg) => Some(Summarizer::new(
            cfg,
            site_config.extraction.default_subtype.clone(),
        )?),
        None => {
            info!("No summary credentials, using locally-derived summaries");
            None
        }
    };

    let records = store.list_all().await?;
    let cache = SummaryCache::preload(&records);

    for category in [Category::Kaufen, Category::Mieten] {
        if !mode.includes(category) {
            continue;
        }

        let mut desired = Vec::new();
        for listing in listings.iter().filter(|l| l.category == category) {
            let summary = match &summarizer {
                Some(s) => s.summarize(listing, &cache).await,
                None => cached_or_local(listing, &cache, &site_config.extraction.default_subtype),
            };
            desired.push(listing.to_fields(Some(summary)));
        }

        sync_category(&store, category, &desired, &records, strict_keys).await?;
    }

    info!("🎉 Sync completed successfully");
    Ok(())
}

/// Walk the paginated list pages and parse every new detail link. Pagination
/// ends quietly on the first page that contributes nothing new; a list page
/// that still fails after retries aborts pagination loudly instead.
async fn scrape_listings(
    config: &SiteConfig,
    fetcher: &mut PageFetcher,
    parser: &DetailParser,
) -> Result<Vec<ScrapedListing>> {
    let mut listings = Vec::new();
    let mut seen = HashSet::new();

    for (page_index, page_url) in config.list_page_urls().iter().enumerate() {
        let page_number = page_index + 1;
        let html = match fetcher.fetch_plain(page_url).await {
            Ok(html) => html,
            Err(e) => {
                error!(
                    "List page {} failed after retries, stopping pagination: {}",
                    page_url, e
                );
                break;
            }
        };

        let links = extract_detail_links(
            &html,
            &config.site.base_url,
            &config.site.detail_link_marker,
        );
        let new_links: Vec<String> = links
            .into_iter()
            .filter(|link| seen.insert(link.clone()))
            .collect();
        if new_links.is_empty() && page_number > 1 {
            info!(
                "Page {} contributed no new listings, stopping pagination",
                page_number
            );
            break;
        }
        info!("Page {}: {} new detail links", page_number, new_links.len());

        for url in new_links {
            match parser.parse_detail(fetcher, &url).await {
                Ok(listing) => {
                    if is_sold(&listing.title) {
                        info!("Skipping sold listing: {}", listing.title);
                    } else {
                        info!(
                            "Scraped '{}' ({}, id '{}')",
                            listing.title,
                            listing.category.label(),
                            listing.listing_id
                        );
                        listings.push(listing);
                    }
                }
                Err(e) => warn!("Failed to parse {}: {}", url, e),
            }
            sleep(Duration::from_millis(config.scraping.detail_delay_ms)).await;
        }

        sleep(Duration::from_millis(config.scraping.page_delay_ms)).await;
    }

    Ok(listings)
}
