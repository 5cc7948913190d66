//! Harvest and refresh runs
//!
//! A [`CrawlSession`] holds everything one run needs: the fetch guard, the
//! store, the site adapter and the per-run buffers. It is consumed by the
//! run and discarded afterwards, so nothing leaks from one run to the next.
//!
//! # Harvest
//!
//! 1. Create the listing table if needed and read the stored ids once
//! 2. Walk the catalog to its end
//! 3. Drop references whose id is stored or repeated
//! 4. Fetch, extract and normalize each new listing
//! 5. Insert in batches, plus a final flush
//!
//! # Refresh
//!
//! Re-fetches every active listing, least recently checked first, applies the
//! reconciler's action and stamps the listing as checked.

use crate::adapter::SiteAdapter;
use crate::browser::Browser;
use crate::config::{Config, SiteConfig};
use crate::crawler::dedup::filter_new;
use crate::crawler::fetch_guard::{FetchGuard, FetchResult};
use crate::crawler::reconciler::{Action, FreshFetch, Reconciler, RemovalReason};
use crate::crawler::walker::PageWalker;
use crate::normalize::Normalizer;
use crate::record::{Category, FieldValue, ItemReference, NormalizedRecord, StoredRecord};
use crate::storage::{ListingTable, RunKind, RunStats, RunStatus, Storage};
use crate::{HarvestError, Result};

/// Run parameters that do not change between items
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Highest catalog page requested
    pub page_limit: u32,
    /// Records buffered before each store flush
    pub batch_size: usize,
    /// Query parameter carrying the page number
    pub page_param: Option<String>,
    /// Hash of the configuration, recorded on the run
    pub config_hash: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_limit: 100,
            batch_size: 5,
            page_param: None,
            config_hash: String::new(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config, site: &SiteConfig, config_hash: &str) -> Self {
        Self {
            page_limit: config.harvest.page_limit,
            batch_size: config.harvest.batch_size.max(1),
            page_param: site.page_param.clone(),
            config_hash: config_hash.to_string(),
        }
    }
}

/// State of one harvest or refresh run
pub struct CrawlSession<'a, B: Browser, S: Storage> {
    guard: &'a mut FetchGuard<B>,
    store: &'a mut S,
    adapter: &'a dyn SiteAdapter,
    normalizer: Normalizer,
    category: Category,
    table: ListingTable,
    options: SessionOptions,
    pending: Vec<NormalizedRecord>,
    stats: RunStats,
}

impl<'a, B: Browser, S: Storage> CrawlSession<'a, B, S> {
    pub fn new(
        guard: &'a mut FetchGuard<B>,
        store: &'a mut S,
        adapter: &'a dyn SiteAdapter,
        normalizer: Normalizer,
        category: Category,
        options: SessionOptions,
    ) -> Self {
        let table = ListingTable::new(adapter.name(), category);
        Self {
            guard,
            store,
            adapter,
            normalizer,
            category,
            table,
            options,
            pending: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn table(&self) -> &ListingTable {
        &self.table
    }

    /// Discovers and inserts new listings of the catalog at `catalog_template`
    ///
    /// # Returns
    ///
    /// * `Ok(RunStats)` - Counters of the completed run
    /// * `Err(HarvestError::StoreUnavailable)` - The store failed before any fetch
    /// * `Err(HarvestError::FetchFailure)` - A page never rendered; flushed
    ///   batches stay committed
    pub async fn harvest(mut self, catalog_template: &str) -> Result<RunStats> {
        let run_id = self.begin(RunKind::Harvest)?;
        tracing::info!(
            "Starting harvest run {} for {}",
            run_id,
            self.table.name()
        );

        let result = self.run_harvest(catalog_template).await;
        self.finish(run_id, result)
    }

    /// Re-checks every active stored listing
    pub async fn refresh(mut self) -> Result<RunStats> {
        let run_id = self.begin(RunKind::Refresh)?;
        tracing::info!(
            "Starting refresh run {} for {}",
            run_id,
            self.table.name()
        );

        let result = self.run_refresh().await;
        self.finish(run_id, result)
    }

    /// Prepares the table and records the run; failures here are fatal
    fn begin(&mut self, kind: RunKind) -> Result<i64> {
        self.store
            .create_if_missing(&self.table)
            .map_err(HarvestError::StoreUnavailable)?;

        self.store
            .create_run(kind, &self.table, &self.options.config_hash)
            .map_err(HarvestError::StoreUnavailable)
    }

    fn finish(&mut self, run_id: i64, result: Result<()>) -> Result<RunStats> {
        let (status, error) = match &result {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };

        if let Err(e) = self
            .store
            .finish_run(run_id, status, &self.stats, error.as_deref())
        {
            tracing::warn!("Failed to record the end of run {}: {}", run_id, e);
        }

        match result {
            Ok(()) => {
                tracing::info!("Run {} completed: {:?}", run_id, self.stats);
                Ok(self.stats)
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                Err(e)
            }
        }
    }

    // ===== Harvest =====

    async fn run_harvest(&mut self, catalog_template: &str) -> Result<()> {
        let existing = self
            .store
            .existing_stable_ids(&self.table)
            .map_err(HarvestError::StoreUnavailable)?;
        tracing::info!("{} listings already stored", existing.len());

        let mut walker = PageWalker::new(
            catalog_template,
            self.options.page_limit,
            self.options.page_param.clone(),
        );
        let (references, pages) = walker.collect(&mut *self.guard, self.adapter).await?;
        self.stats.pages_walked = pages;
        self.stats.discovered = references.len() as u32;

        let outcome = filter_new(references, &existing);
        self.stats.known = outcome.known as u32;

        let fetched = self.harvest_details(outcome.fresh).await;

        // Records normalized before a failure are complete and safe to keep
        let flushed = self.flush();
        match fetched {
            Ok(()) => flushed,
            Err(e) => {
                if let Err(flush_error) = flushed {
                    tracing::warn!("Final flush after failure also failed: {}", flush_error);
                }
                Err(e)
            }
        }
    }

    async fn harvest_details(&mut self, references: Vec<ItemReference>) -> Result<()> {
        let adapter = self.adapter;
        let total = references.len();

        for (index, reference) in references.into_iter().enumerate() {
            tracing::debug!("[{}/{}] {}", index + 1, total, reference.url);

            let fetched = self
                .guard
                .fetch(
                    &reference.url,
                    adapter.detail_selector(),
                    Some(&reference),
                    Some(adapter),
                )
                .await?;

            let (final_url, source, delisted) = match fetched {
                FetchResult::Loaded(page) => (page.final_url, page.source, false),
                FetchResult::Delisted { final_url, source } => (final_url, source, true),
                FetchResult::Invalid { final_url, .. } => {
                    tracing::info!(
                        "Dropping {}: dead link (landed on {})",
                        reference.url,
                        final_url
                    );
                    self.stats.dropped += 1;
                    continue;
                }
            };

            let mut raw = adapter.detail_raw_fields(&final_url, &source)?;
            raw.removed |= delisted;
            let record = self.normalizer.normalize(&reference, &raw, self.category);
            if record.removed {
                tracing::info!("{} is already delisted, storing it as removed", reference.url);
            }

            self.pending.push(record);
            if self.pending.len() >= self.options.batch_size {
                self.flush()?;
            }
        }

        Ok(())
    }

    /// Writes the pending batch in one transaction
    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let written = self.store.insert_batch(&self.table, &self.pending)?;
        tracing::info!(
            "Flushed {} listings to {} ({} new)",
            self.pending.len(),
            self.table.name(),
            written
        );

        self.stats.inserted += written as u32;
        self.pending.clear();
        Ok(())
    }

    // ===== Refresh =====

    async fn run_refresh(&mut self) -> Result<()> {
        let stale = self
            .store
            .pending_for_refresh(&self.table)
            .map_err(HarvestError::StoreUnavailable)?;
        tracing::info!("{} listings to re-check", stale.len());

        let reconciler = Reconciler::new(self.normalizer.clone(), self.category);
        let adapter = self.adapter;

        for stored in stale {
            let reference = stored.reference();
            let fetched = self
                .guard
                .fetch(
                    &reference.url,
                    adapter.detail_selector(),
                    Some(&reference),
                    Some(adapter),
                )
                .await?;

            let fresh = match fetched {
                FetchResult::Loaded(page) => {
                    FreshFetch::Page(adapter.detail_raw_fields(&page.final_url, &page.source)?)
                }
                FetchResult::Delisted { .. } => FreshFetch::DeadLink {
                    delisting_marker: true,
                },
                FetchResult::Invalid { .. } => FreshFetch::DeadLink {
                    delisting_marker: false,
                },
            };

            let action = reconciler.reconcile(&stored, &fresh);
            self.apply(&stored, action)?;
            self.store.touch_checked(&self.table, &stored.stable_id)?;
            self.stats.checked += 1;
        }

        Ok(())
    }

    fn apply(&mut self, stored: &StoredRecord, action: Action) -> Result<()> {
        match action {
            Action::MarkRemoved(RemovalReason::AlreadyRemoved) => {
                tracing::debug!("{} already removed", stored.url);
            }
            Action::MarkRemoved(reason) => {
                if self.store.mark_removed(&self.table, &stored.stable_id)? {
                    tracing::info!("Marking {} removed ({:?})", stored.url, reason);
                    self.stats.removed += 1;
                }
            }
            Action::UpdateFields(changes) if changes.is_empty() => {
                tracing::debug!("{} unchanged", stored.url);
                self.stats.unchanged += 1;
            }
            Action::UpdateFields(changes) => {
                for change in &changes {
                    tracing::info!(
                        url = %stored.url,
                        field = %change.feature,
                        old = %display_value(change.old.as_ref()),
                        new = %change.new,
                        "Field changed"
                    );
                }
                self.store
                    .update_fields(&self.table, &stored.stable_id, &changes)?;
                self.stats.updated += 1;
            }
        }

        Ok(())
    }
}

fn display_value(value: Option<&FieldValue>) -> String {
    value.map_or_else(|| "null".to_string(), FieldValue::to_string)
}
