//! listing-harvest: incremental real-estate listing harvester
//!
//! This crate walks paginated listing catalogs, extracts detail pages through
//! pluggable site adapters, normalizes the noisy text into typed fields, and
//! reconciles the result against a SQLite store so that repeated runs never
//! duplicate a listing, detect delisted items, and only rewrite fields that
//! actually changed.

pub mod adapter;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod normalize;
pub mod output;
pub mod record;
pub mod storage;

use thiserror::Error;

/// Main error type for harvest and refresh runs
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] storage::StorageError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] adapter::AdapterError),

    #[error(
        "Element '{selector}' never appeared on {url} after {attempts} attempts; \
         selectors may be stale or the client is blocked"
    )]
    FetchFailure {
        url: String,
        selector: String,
        attempts: u32,
    },

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Site '{site}' has no catalog for category {category}")]
    MissingCatalog { site: String, category: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),

    #[error("Invalid pattern in config: {0}")]
    InvalidPattern(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSession, RunStats};
pub use record::{Category, Feature, ItemReference, NormalizedRecord, RawFields, StoredRecord};
