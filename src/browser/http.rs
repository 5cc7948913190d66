//! HTTP browser backend
//!
//! This module implements [`Browser`] on top of `reqwest`:
//! - Each session owns its own cookie jar
//! - Redirects are followed and the final URL is reported as the current one
//! - Element probes run CSS selectors against the last fetched source
//! - `reset_session` rebuilds the client with an empty jar and the next
//!   user agent of the rotation

use crate::browser::{Browser, BrowserError, BrowserResult};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use scraper::{Html, Selector};
use std::time::Duration;

/// User agents rotated through when the configuration names none
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// A page as last seen by the session
#[derive(Debug, Clone)]
struct LoadedPage {
    url: String,
    source: String,
}

/// Browser session over plain HTTP
pub struct HttpSession {
    client: Client,
    user_agents: Vec<String>,
    agent_index: usize,
    timeout: Duration,
    page: Option<LoadedPage>,
}

impl HttpSession {
    /// Creates a session from the browser configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HttpSession)` - Client built with the first user agent
    /// * `Err(BrowserError)` - The HTTP client could not be built
    pub fn new(config: &BrowserConfig) -> BrowserResult<Self> {
        let user_agents: Vec<String> = if config.user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            config.user_agents.clone()
        };
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = build_client(&user_agents[0], timeout)?;

        Ok(Self {
            client,
            user_agents,
            agent_index: 0,
            timeout,
            page: None,
        })
    }

    /// User agent currently presented to sites
    pub fn user_agent(&self) -> &str {
        &self.user_agents[self.agent_index]
    }

    fn page(&self) -> BrowserResult<&LoadedPage> {
        self.page.as_ref().ok_or(BrowserError::NoPage)
    }
}

/// Builds a client with a fresh cookie store
fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

#[async_trait]
impl Browser for HttpSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        // A failed load must not leave the previous page current
        self.page = None;

        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| BrowserError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        let status = response.status();
        let final_url = response.url().to_string();

        // Error pages are still pages; the element probe decides what they mean
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "Non-success response");
        }

        let source = response
            .text()
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        self.page = Some(LoadedPage {
            url: final_url,
            source,
        });
        Ok(())
    }

    async fn page_source(&self) -> BrowserResult<String> {
        Ok(self.page()?.source.clone())
    }

    async fn element_present(&self, selector: &str) -> BrowserResult<bool> {
        let parsed = Selector::parse(selector)
            .map_err(|_| BrowserError::InvalidSelector(selector.to_string()))?;
        let page = match &self.page {
            Some(page) => page,
            None => return Ok(false),
        };

        let document = Html::parse_document(&page.source);
        let found = document.select(&parsed).next().is_some();
        Ok(found)
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page()?.url.clone())
    }

    async fn reset_session(&mut self) -> BrowserResult<()> {
        self.agent_index = (self.agent_index + 1) % self.user_agents.len();
        self.client = build_client(&self.user_agents[self.agent_index], self.timeout)?;
        self.page = None;

        tracing::debug!(user_agent = %self.user_agent(), "Started fresh browser session");
        Ok(())
    }
}
