//! Configuration-driven site adapter
//!
//! Reads catalog tiles, detail fields and delisting notices with the CSS
//! selectors of a `[[site]]` entry.

use crate::adapter::{AdapterError, AdapterResult, SiteAdapter};
use crate::config::SiteConfig;
use crate::record::{Feature, ItemReference, RawFields};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// How one feature is read from a detail page
#[derive(Debug, Clone)]
struct FieldExtractor {
    feature: Feature,
    selector: Selector,
    contains: Option<String>,
}

/// A [`SiteAdapter`] built from selector rules
#[derive(Debug, Clone)]
pub struct SelectorAdapter {
    name: String,
    base_url: Url,
    tile_selector_text: String,
    tile_selector: Selector,
    detail_selector_text: String,
    delisted_selector: Option<Selector>,
    delisted_text: Option<String>,
    id_pattern: Option<Regex>,
    fields: Vec<FieldExtractor>,
}

impl SelectorAdapter {
    /// Compiles the selectors and patterns of a site entry
    pub fn from_config(site: &SiteConfig) -> AdapterResult<Self> {
        let base_url = Url::parse(&site.base_url)
            .map_err(|e| AdapterError::InvalidUrl(format!("{}: {}", site.base_url, e)))?;

        let id_pattern = site
            .id_pattern
            .as_deref()
            .map(|p| Regex::new(p).map_err(|e| AdapterError::InvalidPattern(e.to_string())))
            .transpose()?;

        let fields = site
            .fields
            .iter()
            .map(|(name, rule)| -> AdapterResult<FieldExtractor> {
                let feature = Feature::from_name(name).ok_or_else(|| AdapterError::Layout {
                    url: site.base_url.clone(),
                    reason: format!("unknown field '{}'", name),
                })?;
                Ok(FieldExtractor {
                    feature,
                    selector: parse_selector(&rule.selector)?,
                    contains: rule.contains.as_deref().map(str::to_lowercase),
                })
            })
            .collect::<AdapterResult<Vec<_>>>()?;

        Ok(Self {
            name: site.name.clone(),
            base_url,
            tile_selector_text: site.tile_selector.clone(),
            tile_selector: parse_selector(&site.tile_selector)?,
            detail_selector_text: site.detail_selector.clone(),
            delisted_selector: site
                .delisted_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?,
            delisted_text: site.delisted_text.as_deref().map(notice_text),
            id_pattern,
            fields,
        })
    }

    /// Resolves a tile link against the site base URL
    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with('#')
        {
            return None;
        }

        let url = self.base_url.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then(|| url.to_string())
    }
}

fn parse_selector(selector: &str) -> AdapterResult<Selector> {
    Selector::parse(selector).map_err(|_| AdapterError::InvalidSelector(selector.to_string()))
}

/// Visible text of an element with whitespace collapsed
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes a delisting notice for comparison; apostrophes are dropped
fn notice_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\'' | '’' | '`'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// URL without query string or fragment
fn strip_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(url)
            .to_string(),
    }
}

impl SiteAdapter for SelectorAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_selector(&self) -> &str {
        &self.tile_selector_text
    }

    fn detail_selector(&self) -> &str {
        &self.detail_selector_text
    }

    fn tile_references(&self, catalog_source: &str) -> AdapterResult<Vec<ItemReference>> {
        let document = Html::parse_document(catalog_source);

        let references = document
            .select(&self.tile_selector)
            .filter_map(|tile| tile.value().attr("href"))
            .filter_map(|href| self.resolve(href))
            .map(|url| self.reference_for(&url))
            .collect();

        Ok(references)
    }

    fn detail_raw_fields(&self, url: &str, detail_source: &str) -> AdapterResult<RawFields> {
        let document = Html::parse_document(detail_source);
        let mut raw = RawFields::new(url);
        raw.removed = self.is_explicitly_delisted(detail_source);

        for extractor in &self.fields {
            let found = document
                .select(&extractor.selector)
                .map(|element| element_text(&element))
                .find(|text| match &extractor.contains {
                    Some(marker) => text.to_lowercase().contains(marker),
                    None => !text.is_empty(),
                });

            if let Some(text) = found {
                raw.insert(extractor.feature, text);
            }
        }

        Ok(raw)
    }

    fn is_explicitly_delisted(&self, source: &str) -> bool {
        let Some(selector) = &self.delisted_selector else {
            return false;
        };

        let document = Html::parse_document(source);
        let mut notices = document.select(selector);

        match &self.delisted_text {
            Some(expected) => {
                notices.any(|element| notice_text(&element_text(&element)) == *expected)
            }
            None => notices.next().is_some(),
        }
    }

    fn stable_id_of(&self, url: &str) -> String {
        self.id_pattern
            .as_ref()
            .and_then(|pattern| pattern.captures(url))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| strip_query(url))
    }
}
