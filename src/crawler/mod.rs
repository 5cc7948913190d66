//! Crawler module for harvesting and refreshing listings
//!
//! This module contains the crawl-and-reconcile engine, including:
//! - Guarded page fetching with session resets and jittered retries
//! - Catalog pagination with clamp detection
//! - Deduplication against the store
//! - Reconciliation of stored listings with fresh fetches
//! - Harvest and refresh run orchestration

mod dedup;
mod fetch_guard;
mod reconciler;
mod session;
mod walker;

pub use dedup::{filter_new, DedupOutcome};
pub use fetch_guard::{FetchGuard, FetchResult, LoadedPage, RetryPolicy};
pub use reconciler::{Action, FreshFetch, Reconciler, RemovalReason};
pub use session::{CrawlSession, SessionOptions};
pub use walker::{reflected_page, CatalogPage, PageWalker};

pub use crate::storage::RunStats;

use crate::adapter::SelectorAdapter;
use crate::browser::HttpSession;
use crate::config::{Config, SiteConfig};
use crate::normalize::Normalizer;
use crate::record::Category;
use crate::storage::{open_storage, ListingTable, RunKind};
use crate::{HarvestError, Result};
use std::path::Path;

/// Runs a harvest or refresh for the selected sites and categories
///
/// Sites and categories are processed one after the other, each with its
/// own browser session. Categories without a catalog template are skipped
/// unless explicitly requested.
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file, recorded on each run
/// * `kind` - Harvest or refresh
/// * `site_filter` - Only run this site
/// * `category_filter` - Only run this category
///
/// # Returns
///
/// * `Ok(results)` - Counters per listing table
/// * `Err(HarvestError)` - The first run that failed
pub async fn run(
    config: &Config,
    config_hash: &str,
    kind: RunKind,
    site_filter: Option<&str>,
    category_filter: Option<Category>,
) -> Result<Vec<(ListingTable, RunStats)>> {
    let sites: Vec<&SiteConfig> = match site_filter {
        Some(name) => vec![config
            .site(name)
            .ok_or_else(|| HarvestError::UnknownSite(name.to_string()))?],
        None => config.sites.iter().collect(),
    };

    let mut store = open_storage(Path::new(&config.store.database_path))
        .map_err(HarvestError::StoreUnavailable)?;

    let categories = match category_filter {
        Some(category) => vec![category],
        None => Category::all().to_vec(),
    };

    let mut results = Vec::new();
    for site in sites {
        let adapter = SelectorAdapter::from_config(site)?;

        for &category in &categories {
            let template = match (site.catalog_template(category), category_filter) {
                (Some(template), _) => template,
                (None, Some(_)) => {
                    return Err(HarvestError::MissingCatalog {
                        site: site.name.clone(),
                        category: category.to_string(),
                    })
                }
                (None, None) => continue,
            };

            let browser = HttpSession::new(&config.browser)?;
            let mut guard = FetchGuard::from_config(browser, &config.fetch);
            let session = CrawlSession::new(
                &mut guard,
                &mut store,
                &adapter,
                Normalizer::new(site.postal_prefix.as_str()),
                category,
                SessionOptions::from_config(config, site, config_hash),
            );
            let table = session.table().clone();

            let stats = match kind {
                RunKind::Harvest => session.harvest(template).await?,
                RunKind::Refresh => session.refresh().await?,
            };
            results.push((table, stats));
        }
    }

    Ok(results)
}
