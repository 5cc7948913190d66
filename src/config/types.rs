use crate::record::Category;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for listing-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    pub store: StoreConfig,
    #[serde(rename = "site", default)]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Looks up a site by name
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.name == name)
    }
}

/// Fetch guard behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Session resets attempted after the first wait times out
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// How long to wait for the required element (milliseconds)
    #[serde(rename = "element-timeout-ms", default = "default_element_timeout_ms")]
    pub element_timeout_ms: u64,

    /// Interval between element probes (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Fixed part of the delay after a session reset (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound of the random part of that delay (milliseconds)
    #[serde(rename = "retry-jitter-ms", default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Seed for the retry jitter; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            element_timeout_ms: default_element_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            seed: None,
        }
    }
}

/// Harvest run limits
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Highest catalog page to request
    #[serde(rename = "page-limit", default = "default_page_limit")]
    pub page_limit: u32,

    /// Records buffered before a store flush
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            batch_size: default_batch_size(),
        }
    }
}

/// HTTP browser backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User agents rotated on every session reset
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            user_agents: Vec::new(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One listing site and how to read it
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site name, also the prefix of its table names
    pub name: String,

    /// Base URL relative tile links are resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Leading digits of the postal codes this site is harvested for
    #[serde(rename = "postal-prefix", default = "default_postal_prefix")]
    pub postal_prefix: String,

    /// Query parameter carrying the page number, if the site uses one
    #[serde(rename = "page-param", default)]
    pub page_param: Option<String>,

    /// Regex whose first capture group is the stable id of a detail URL
    #[serde(rename = "id-pattern", default)]
    pub id_pattern: Option<String>,

    /// Selector matching listing links on a catalog page
    #[serde(rename = "tile-selector")]
    pub tile_selector: String,

    /// Selector that must be present once a detail page has loaded
    #[serde(rename = "detail-selector")]
    pub detail_selector: String,

    /// Selector of the element carrying the delisting notice
    #[serde(rename = "delisted-selector", default)]
    pub delisted_selector: Option<String>,

    /// Notice text marking a listing as no longer available
    #[serde(rename = "delisted-text", default)]
    pub delisted_text: Option<String>,

    pub catalog: CatalogConfig,

    /// Extraction rule per feature name (e.g. `price-per-sqm`)
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRule>,
}

impl SiteConfig {
    /// Catalog URL template for a category
    pub fn catalog_template(&self, category: Category) -> Option<&str> {
        match category {
            Category::Buy => self.catalog.buy.as_deref(),
            Category::Rent => self.catalog.rent.as_deref(),
        }
    }
}

/// Catalog URL templates; `{page}` is replaced by the page number
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub buy: Option<String>,
    #[serde(default)]
    pub rent: Option<String>,
}

/// How to read one feature from a detail page
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    /// Selector of the candidate elements
    pub selector: String,

    /// Keep only the first candidate whose text contains this marker
    #[serde(default)]
    pub contains: Option<String>,
}

fn default_max_retries() -> u32 {
    5
}

fn default_element_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_retry_delay_ms() -> u64 {
    3_000
}

fn default_retry_jitter_ms() -> u64 {
    1_000
}

fn default_page_limit() -> u32 {
    100
}

fn default_batch_size() -> usize {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_postal_prefix() -> String {
    "75".to_string()
}
