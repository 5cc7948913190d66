//! Retry-driven page fetching
//!
//! This module wraps a [`Browser`] with the retry policy every fetch goes
//! through:
//! - Navigate and poll for a required element until a timeout
//! - On timeout, report a delisting notice or a page that no longer
//!   identifies the item
//! - Otherwise reset the session, re-navigate, pause with jitter and wait again
//! - Give up with a fatal [`HarvestError::FetchFailure`] once retries run out
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Element present | Return the loaded page |
//! | Timeout, delisting notice shown | Immediate → Delisted |
//! | Timeout, identity check fails | Immediate → Invalid |
//! | Timeout or navigation error | Reset session, retry after delay |
//! | Retries exhausted | Fatal FetchFailure |
//!
//! Pages are only inspected after a successful navigation; a failed load
//! says nothing about the item.

use crate::adapter::SiteAdapter;
use crate::browser::{Browser, BrowserError};
use crate::config::FetchConfig;
use crate::record::ItemReference;
use crate::{HarvestError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timing and attempt limits of a [`FetchGuard`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Session resets after the first wait times out
    pub max_retries: u32,
    /// How long to wait for the required element per attempt
    pub element_timeout: Duration,
    /// Interval between element probes
    pub poll_interval: Duration,
    /// Fixed part of the pause after a reset
    pub retry_delay: Duration,
    /// Upper bound of the random part of that pause
    pub retry_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            element_timeout: Duration::from_millis(config.element_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            retry_jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// Pause before waiting again after a reset: `retry_delay + U[0, retry_jitter]`
    pub fn retry_pause(&self, rng: &mut StdRng) -> Duration {
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=jitter_ms)
        };
        self.retry_delay + Duration::from_millis(extra)
    }
}

/// A page whose required element appeared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    pub requested_url: String,
    /// URL reported by the browser after redirects
    pub final_url: String,
    pub source: String,
}

/// Outcome of a guarded fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The required element appeared
    Loaded(LoadedPage),

    /// The site shows its "no longer available" notice instead of the item
    Delisted { final_url: String, source: String },

    /// The page no longer identifies the requested item (dead link)
    Invalid {
        final_url: String,
        /// Source of whatever the browser landed on, empty if unreadable
        source: String,
    },
}

/// Fetches pages through a browser under a retry policy
pub struct FetchGuard<B: Browser> {
    browser: B,
    policy: RetryPolicy,
    rng: StdRng,
}

impl<B: Browser> FetchGuard<B> {
    /// Creates a guard with an explicit randomness source
    pub fn new(browser: B, policy: RetryPolicy, rng: StdRng) -> Self {
        Self {
            browser,
            policy,
            rng,
        }
    }

    /// Creates a guard from the fetch configuration
    ///
    /// The jitter is seeded from `seed` when present, from the OS otherwise.
    pub fn from_config(browser: B, config: &FetchConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(browser, RetryPolicy::from_config(config), rng)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Gives the browser back once the run is over
    pub fn into_browser(self) -> B {
        self.browser
    }

    /// Fetches `url` and waits for `required_selector`
    ///
    /// # Arguments
    ///
    /// * `url` - Page to load
    /// * `required_selector` - Element proving the page rendered
    /// * `identity` - Item the page must still identify; enables dead-link detection
    /// * `delisting` - Adapter recognizing the site's delisting notice
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult::Loaded)` - The element appeared
    /// * `Ok(FetchResult::Delisted)` - The element never appeared but the notice did
    /// * `Ok(FetchResult::Invalid)` - The page stopped identifying `identity`
    /// * `Err(HarvestError::FetchFailure)` - Retries exhausted
    pub async fn fetch(
        &mut self,
        url: &str,
        required_selector: &str,
        identity: Option<&ItemReference>,
        delisting: Option<&dyn SiteAdapter>,
    ) -> Result<FetchResult> {
        let attempts = self.policy.max_retries + 1;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::warn!(
                    "Element '{}' missing on {}, resetting session (retry {}/{})",
                    required_selector,
                    url,
                    attempt - 1,
                    self.policy.max_retries
                );
                if let Err(e) = self.browser.reset_session().await {
                    tracing::warn!("Session reset failed: {}", e);
                }
            }

            let navigated = match self.browser.navigate(url).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Navigation to {} failed: {}", url, e);
                    false
                }
            };

            if attempt > 1 {
                sleep(self.policy.retry_pause(&mut self.rng)).await;
            }

            if !navigated {
                continue;
            }

            if self.wait_for_element(required_selector).await? {
                let page = LoadedPage {
                    requested_url: url.to_string(),
                    final_url: self.browser.current_url().await?,
                    source: self.browser.page_source().await?,
                };
                return Ok(FetchResult::Loaded(page));
            }

            if let Some(adapter) = delisting {
                if let Some(delisted) = self.check_delisting(adapter).await {
                    return Ok(delisted);
                }
            }

            if let Some(reference) = identity {
                if let Some(invalid) = self.check_identity(reference).await {
                    return Ok(invalid);
                }
            }
        }

        Err(HarvestError::FetchFailure {
            url: url.to_string(),
            selector: required_selector.to_string(),
            attempts,
        })
    }

    /// Polls for `selector` until it appears or the element timeout expires
    async fn wait_for_element(&self, selector: &str) -> Result<bool> {
        let deadline = Instant::now() + self.policy.element_timeout;

        loop {
            match self.browser.element_present(selector).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e @ BrowserError::InvalidSelector(_)) => return Err(e.into()),
                Err(e) => tracing::debug!("Element probe failed: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.policy.poll_interval.min(deadline - now)).await;
        }
    }

    /// Returns `Delisted` if the current page carries the delisting notice
    async fn check_delisting(&self, adapter: &dyn SiteAdapter) -> Option<FetchResult> {
        let source = self.browser.page_source().await.ok()?;
        if !adapter.is_explicitly_delisted(&source) {
            return None;
        }

        let final_url = self.browser.current_url().await.ok()?;
        tracing::info!("{} shows a delisting notice", final_url);
        Some(FetchResult::Delisted { final_url, source })
    }

    /// Returns `Invalid` if the current page no longer identifies `reference`
    ///
    /// An unreadable current URL gives no signal.
    async fn check_identity(&self, reference: &ItemReference) -> Option<FetchResult> {
        let current = self.browser.current_url().await.ok()?;
        if reference.matches_url(&current) {
            return None;
        }

        tracing::info!(
            "{} no longer identifies {} (now at {})",
            reference.url,
            reference.stable_id,
            current
        );

        let source = self.browser.page_source().await.unwrap_or_default();
        Some(FetchResult::Invalid {
            final_url: current,
            source,
        })
    }
}
