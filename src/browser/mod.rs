//! Browser automation seam
//!
//! The crawl engine drives pages through the [`Browser`] trait: navigate,
//! read back the source and current URL, probe for an element, and start a
//! fresh session when a site stops cooperating. [`HttpSession`] implements it
//! over plain HTTP with a cookie jar and user-agent rotation.

mod http;

pub use http::{HttpSession, DEFAULT_USER_AGENTS};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a browser backend
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("No page loaded")]
    NoPage,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Minimal browser automation contract used by the crawl engine
#[async_trait]
pub trait Browser: Send + Sync {
    /// Loads `url`, replacing the current page
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// Returns the source of the current page
    async fn page_source(&self) -> BrowserResult<String>;

    /// Returns true if `selector` matches at least one element of the current page
    async fn element_present(&self, selector: &str) -> BrowserResult<bool>;

    /// Returns the URL of the current page after any redirects
    async fn current_url(&self) -> BrowserResult<String>;

    /// Drops cookies and session state and starts over with a fresh identity
    async fn reset_session(&mut self) -> BrowserResult<()>;
}
