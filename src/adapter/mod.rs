//! Site adapters
//!
//! A site adapter knows how one listing site lays out its pages: which
//! links on a catalog page are listing tiles, how to derive a stable id from
//! a detail URL, where each feature lives on a detail page, and how the site
//! says a listing is gone. The crawl engine never touches markup itself.
//!
//! [`SelectorAdapter`] covers sites whose layout can be described with CSS
//! selectors in the `[[site]]` configuration.

mod selector;

pub use selector::SelectorAdapter;

use crate::record::{ItemReference, RawFields};
use thiserror::Error;

/// Errors raised by site adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("Invalid id pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected page layout at {url}: {reason}")]
    Layout { url: String, reason: String },
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Site-specific extraction rules
pub trait SiteAdapter: Send + Sync {
    /// Site name, used as the table prefix
    fn name(&self) -> &str;

    /// Selector present once a catalog page has rendered its tiles
    fn tile_selector(&self) -> &str;

    /// Selector present once a detail page has rendered
    fn detail_selector(&self) -> &str;

    /// Extracts the listing references of a catalog page, in page order
    fn tile_references(&self, catalog_source: &str) -> AdapterResult<Vec<ItemReference>>;

    /// Extracts the raw feature text of a detail page
    fn detail_raw_fields(&self, url: &str, detail_source: &str) -> AdapterResult<RawFields>;

    /// Returns true if the page carries the site's "no longer available" notice
    fn is_explicitly_delisted(&self, source: &str) -> bool;

    /// Derives the stable identifier of a detail URL
    ///
    /// Must be deterministic and must not depend on page content.
    fn stable_id_of(&self, url: &str) -> String;

    /// Builds the reference of a detail URL
    fn reference_for(&self, url: &str) -> ItemReference {
        ItemReference::new(url, self.stable_id_of(url))
    }
}
