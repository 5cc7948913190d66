//! Catalog pagination
//!
//! Walks the pages of a catalog in order and collects the listing
//! references of each. Sites rarely report their last page; instead, asking
//! for a page past the end silently serves the last real page. The walker
//! detects that by comparing the page number it asked for with the one
//! reflected in the URL the browser ended up on, and stops there.

use crate::adapter::SiteAdapter;
use crate::browser::Browser;
use crate::crawler::fetch_guard::{FetchGuard, FetchResult};
use crate::record::ItemReference;
use crate::Result;
use url::Url;

/// Placeholder replaced by the page number in catalog templates
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// One walked catalog page
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub number: u32,
    pub url: String,
    pub references: Vec<ItemReference>,
}

/// Lazily walks catalog pages `1..=page_limit`
///
/// Not restartable: once it has stopped, it keeps returning `None`.
#[derive(Debug)]
pub struct PageWalker {
    template: String,
    page_limit: u32,
    page_param: Option<String>,
    next: u32,
    finished: bool,
}

impl PageWalker {
    pub fn new(template: impl Into<String>, page_limit: u32, page_param: Option<String>) -> Self {
        Self {
            template: template.into(),
            page_limit,
            page_param,
            next: 1,
            finished: false,
        }
    }

    /// URL of catalog page `page`
    pub fn page_url(&self, page: u32) -> String {
        self.template.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    /// Fetches the next catalog page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(page))` - References of the next page, in page order
    /// * `Ok(None)` - The page limit was reached or the site clamped pagination
    /// * `Err(HarvestError)` - The catalog could not be fetched
    pub async fn next_page<B: Browser>(
        &mut self,
        guard: &mut FetchGuard<B>,
        adapter: &dyn SiteAdapter,
    ) -> Result<Option<CatalogPage>> {
        if self.finished || self.next > self.page_limit {
            self.finished = true;
            return Ok(None);
        }

        let number = self.next;
        let url = self.page_url(number);

        let page = match guard.fetch(&url, adapter.tile_selector(), None, None).await? {
            FetchResult::Loaded(page) => page,
            FetchResult::Delisted { final_url, .. } | FetchResult::Invalid { final_url, .. } => {
                tracing::info!("Catalog page {} resolved to {}, stopping", number, final_url);
                self.finished = true;
                return Ok(None);
            }
        };

        let reflected = reflected_page(&page.final_url, self.page_param.as_deref());
        if reflected != number {
            tracing::info!(
                "Requested page {} but landed on page {} ({}), pagination ends here",
                number,
                reflected,
                page.final_url
            );
            self.finished = true;
            return Ok(None);
        }

        let references = adapter.tile_references(&page.source)?;
        tracing::debug!("Page {}: {} references", number, references.len());

        self.next += 1;
        Ok(Some(CatalogPage {
            number,
            url,
            references,
        }))
    }

    /// Walks every remaining page and returns the references in discovery order
    ///
    /// Duplicates across pages are kept.
    pub async fn collect<B: Browser>(
        &mut self,
        guard: &mut FetchGuard<B>,
        adapter: &dyn SiteAdapter,
    ) -> Result<(Vec<ItemReference>, u32)> {
        let mut references = Vec::new();
        let mut pages = 0;

        while let Some(page) = self.next_page(guard, adapter).await? {
            pages += 1;
            references.extend(page.references);
        }

        tracing::info!(
            "Walked {} catalog pages, {} references",
            pages,
            references.len()
        );
        Ok((references, pages))
    }
}

/// Page number reflected in a catalog URL
///
/// With a `page_param`, the value of that query parameter; otherwise the
/// trailing digits of the URL once trailing punctuation is stripped. A URL
/// carrying no page number is page 1.
pub fn reflected_page(url: &str, page_param: Option<&str>) -> u32 {
    if let Some(param) = page_param {
        let value = Url::parse(url).ok().and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == param)
                .map(|(_, value)| value.into_owned())
        });

        return match value {
            Some(value) => value.trim().parse().unwrap_or(0),
            None => 1,
        };
    }

    let trimmed = url.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    let digits: String = trimmed
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.is_empty() {
        1
    } else {
        digits.parse().unwrap_or(0)
    }
}
