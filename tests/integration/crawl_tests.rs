//! Integration tests for harvest and refresh runs
//!
//! Most tests drive a [`CrawlSession`] through a scripted in-memory browser
//! so every page the site serves is spelled out in the test. The last test
//! runs the whole pipeline over HTTP against a wiremock server.

use async_trait::async_trait;
use listing_harvest::adapter::SelectorAdapter;
use listing_harvest::browser::{Browser, BrowserError, BrowserResult};
use listing_harvest::config::{parse_config, Config, SiteConfig};
use listing_harvest::crawler::{self, CrawlSession, FetchGuard, SessionOptions};
use listing_harvest::normalize::Normalizer;
use listing_harvest::record::{Category, FieldValue};
use listing_harvest::storage::{
    ListingTable, RunKind, RunStats, RunStatus, SqliteStorage, Storage,
};
use listing_harvest::HarvestError;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = "https://listings.test/";
const HOME_HTML: &str = "<html><body><h1>Bienvenue</h1></body></html>";

const CONFIG: &str = r#"
[fetch]
max-retries = 1
element-timeout-ms = 20
poll-interval-ms = 5
retry-delay-ms = 0
retry-jitter-ms = 0
seed = 1

[harvest]
page-limit = 100
batch-size = 2

[store]
database-path = "unused.db"

[[site]]
name = "testsite"
base-url = "https://listings.test"
page-param = "page"
id-pattern = "/annonce/([a-z0-9-]+)"
tile-selector = "a.tile"
detail-selector = "div.detail"
delisted-selector = "h1.notice"
delisted-text = "Cette annonce n’est plus disponible"

[site.catalog]
buy = "https://listings.test/achat?page={page}"

[site.fields.price]
selector = "span.price"

[site.fields.size]
selector = "ul.facts li"
contains = "m²"

[site.fields.rooms]
selector = "ul.facts li"
contains = "pièce"

[site.fields.postal-code]
selector = "span.address"
"#;

/// Browser serving a fixed set of pages
///
/// Unknown URLs land on the home page, the way sites redirect dead links.
/// URLs in `fail_once` fail their next load and leave the current page as is.
#[derive(Default)]
struct ScriptedBrowser {
    pages: HashMap<String, (String, String)>,
    fail_once: HashSet<String>,
    current: Option<(String, String)>,
    navigations: Vec<String>,
    resets: u32,
}

impl ScriptedBrowser {
    fn page(mut self, url: &str, html: String) -> Self {
        self.pages
            .insert(url.to_string(), (url.to_string(), html));
        self
    }

    fn redirect(mut self, from: &str, to: &str, html: String) -> Self {
        self.pages.insert(from.to_string(), (to.to_string(), html));
        self
    }

    fn failing_once(mut self, url: &str) -> Self {
        self.fail_once.insert(url.to_string());
        self
    }

    fn detail_navigations(&self) -> usize {
        self.navigations
            .iter()
            .filter(|url| url.contains("/annonce/"))
            .count()
    }

    fn catalog_navigations(&self) -> Vec<&str> {
        self.navigations
            .iter()
            .filter(|url| url.contains("/achat"))
            .map(String::as_str)
            .collect()
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.navigations.push(url.to_string());
        if self.fail_once.remove(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }

        let landed = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| (HOME.to_string(), HOME_HTML.to_string()));
        self.current = Some(landed);
        Ok(())
    }

    async fn page_source(&self) -> BrowserResult<String> {
        self.current
            .as_ref()
            .map(|(_, html)| html.clone())
            .ok_or(BrowserError::NoPage)
    }

    async fn element_present(&self, selector: &str) -> BrowserResult<bool> {
        let parsed = Selector::parse(selector)
            .map_err(|_| BrowserError::InvalidSelector(selector.to_string()))?;
        Ok(self
            .current
            .as_ref()
            .is_some_and(|(_, html)| Html::parse_document(html).select(&parsed).next().is_some()))
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.current
            .as_ref()
            .map(|(url, _)| url.clone())
            .ok_or(BrowserError::NoPage)
    }

    async fn reset_session(&mut self) -> BrowserResult<()> {
        self.resets += 1;
        self.current = None;
        Ok(())
    }
}

fn catalog_url(page: u32) -> String {
    format!("https://listings.test/achat?page={}", page)
}

fn detail_url(id: &str) -> String {
    format!("https://listings.test/annonce/{}", id)
}

fn catalog_html(ids: &[&str]) -> String {
    let tiles: String = ids
        .iter()
        .map(|id| format!(r#"<li><a class="tile" href="/annonce/{}">{}</a></li>"#, id, id))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", tiles)
}

fn detail_html(price: &str, size: Option<&str>, rooms: &str, address: &str) -> String {
    let size = size.map(|s| format!("<li>{}</li>", s)).unwrap_or_default();
    format!(
        r#"<html><body><div class="detail">
            <span class="price">{}</span>
            <ul class="facts">{}<li>{}</li></ul>
            <span class="address">{}</span>
        </div></body></html>"#,
        price, size, rooms, address
    )
}

fn notice_html() -> String {
    r#"<html><body><h1 class="notice">Cette annonce n'est plus disponible</h1></body></html>"#
        .to_string()
}

/// Two catalog pages; asking for page 3 serves page 2 again
fn standard_site() -> ScriptedBrowser {
    ScriptedBrowser::default()
        .page(&catalog_url(1), catalog_html(&["ab-1", "cd-2"]))
        .page(&catalog_url(2), catalog_html(&["cd-2", "ef-3"]))
        .redirect(&catalog_url(3), &catalog_url(2), catalog_html(&["cd-2", "ef-3"]))
        .page(
            &detail_url("ab-1"),
            detail_html("500 000 €", Some("50 m²"), "2 pièces", "Paris 11e (75011)"),
        )
        .page(
            &detail_url("cd-2"),
            detail_html("320 000 €", Some("31 m²"), "1 pièce", "Paris 18e (75018)"),
        )
        .page(
            &detail_url("ef-3"),
            detail_html("1 250 000 €", Some("98 m²"), "4 pièces", "Paris 7e (75007)"),
        )
}

fn config() -> Config {
    parse_config(CONFIG).unwrap()
}

fn site(config: &Config) -> &SiteConfig {
    config.site("testsite").unwrap()
}

fn table() -> ListingTable {
    ListingTable::new("testsite", Category::Buy)
}

async fn harvest(
    browser: ScriptedBrowser,
    store: &mut SqliteStorage,
    config: &Config,
) -> (listing_harvest::Result<RunStats>, ScriptedBrowser) {
    let site = site(config);
    let adapter = SelectorAdapter::from_config(site).unwrap();
    let mut guard = FetchGuard::from_config(browser, &config.fetch);

    let session = CrawlSession::new(
        &mut guard,
        store,
        &adapter,
        Normalizer::new(site.postal_prefix.as_str()),
        Category::Buy,
        SessionOptions::from_config(config, site, "test-hash"),
    );
    let result = session
        .harvest(site.catalog_template(Category::Buy).unwrap())
        .await;

    (result, guard.into_browser())
}

async fn refresh(
    browser: ScriptedBrowser,
    store: &mut SqliteStorage,
    config: &Config,
) -> (listing_harvest::Result<RunStats>, ScriptedBrowser) {
    let site = site(config);
    let adapter = SelectorAdapter::from_config(site).unwrap();
    let mut guard = FetchGuard::from_config(browser, &config.fetch);

    let session = CrawlSession::new(
        &mut guard,
        store,
        &adapter,
        Normalizer::new(site.postal_prefix.as_str()),
        Category::Buy,
        SessionOptions::from_config(config, site, "test-hash"),
    );
    let result = session.refresh().await;

    (result, guard.into_browser())
}

#[tokio::test]
async fn test_harvest_inserts_each_listing_once() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let (result, browser) = harvest(standard_site(), &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.pages_walked, 2);
    assert_eq!(stats.discovered, 4);
    assert_eq!(stats.known, 0);
    assert_eq!(stats.inserted, 3);
    assert_eq!(browser.detail_navigations(), 3);

    let listing = store.get_listing(&table(), "ab-1").unwrap().unwrap();
    assert_eq!(listing.url, detail_url("ab-1"));
    assert!(!listing.removed);
    assert_eq!(listing.features.price, Some(500_000.0));
    assert_eq!(listing.features.size, Some(50.0));
    assert_eq!(listing.features.rooms, Some(2.0));
    assert_eq!(listing.features.postal_code.as_deref(), Some("75011"));
    assert!(listing.last_checked_at.is_none());

    // A second run finds everything already stored
    let (result, browser) = harvest(standard_site(), &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.discovered, 4);
    assert_eq!(stats.known, 4);
    assert_eq!(stats.inserted, 0);
    assert_eq!(browser.detail_navigations(), 0);
    assert_eq!(store.count_listings(&table()).unwrap().total, 3);
}

#[tokio::test]
async fn test_pagination_stops_when_site_clamps() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let (result, browser) = harvest(standard_site(), &mut store, &config).await;
    result.unwrap();

    assert_eq!(
        browser.catalog_navigations(),
        vec![
            catalog_url(1).as_str(),
            catalog_url(2).as_str(),
            catalog_url(3).as_str()
        ]
    );
}

#[tokio::test]
async fn test_page_limit_bounds_walk() {
    let mut config = config();
    config.harvest.page_limit = 1;
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let (result, browser) = harvest(standard_site(), &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.pages_walked, 1);
    assert_eq!(stats.inserted, 2);
    assert_eq!(browser.catalog_navigations(), vec![catalog_url(1).as_str()]);
    assert!(store.get_listing(&table(), "ef-3").unwrap().is_none());
}

#[tokio::test]
async fn test_dead_link_dropped_during_harvest() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let browser = ScriptedBrowser::default()
        .page(&catalog_url(1), catalog_html(&["ab-1", "gone-9"]))
        .redirect(&catalog_url(2), &catalog_url(1), catalog_html(&["ab-1", "gone-9"]))
        .page(
            &detail_url("ab-1"),
            detail_html("500 000 €", Some("50 m²"), "2 pièces", "Paris 11e (75011)"),
        );

    let (result, browser) = harvest(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.dropped, 1);
    // Dead links are detected without a session reset
    assert_eq!(browser.resets, 0);
    assert!(store.get_listing(&table(), "gone-9").unwrap().is_none());
}

#[tokio::test]
async fn test_delisted_detail_stored_as_removed() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let delisted = r#"<html><body><h1 class="notice">Cette annonce n’est plus disponible</h1>
           <div class="detail"><span class="price">410 000 €</span></div></body></html>"#
        .to_string();
    let browser = ScriptedBrowser::default()
        .page(&catalog_url(1), catalog_html(&["ab-1"]))
        .redirect(&catalog_url(2), &catalog_url(1), catalog_html(&["ab-1"]))
        .page(&detail_url("ab-1"), delisted);

    let (result, _) = harvest(browser, &mut store, &config).await;
    assert_eq!(result.unwrap().inserted, 1);

    let listing = store.get_listing(&table(), "ab-1").unwrap().unwrap();
    assert!(listing.removed);
    assert_eq!(listing.features.price, Some(410_000.0));
}

#[tokio::test]
async fn test_fetch_failure_keeps_flushed_listings() {
    let mut config = config();
    config.harvest.batch_size = 5;
    let mut store = SqliteStorage::new_in_memory().unwrap();

    // ef-3 keeps its URL but never renders its content
    let browser = ScriptedBrowser::default()
        .page(&catalog_url(1), catalog_html(&["ab-1", "cd-2", "ef-3"]))
        .redirect(&catalog_url(2), &catalog_url(1), catalog_html(&["ab-1"]))
        .page(
            &detail_url("ab-1"),
            detail_html("500 000 €", Some("50 m²"), "2 pièces", "Paris 11e (75011)"),
        )
        .page(
            &detail_url("cd-2"),
            detail_html("320 000 €", Some("31 m²"), "1 pièce", "Paris 18e (75018)"),
        )
        .page(
            &detail_url("ef-3"),
            "<html><body>Checking your browser...</body></html>".to_string(),
        );

    let (result, browser) = harvest(browser, &mut store, &config).await;

    match result {
        Err(HarvestError::FetchFailure { url, attempts, .. }) => {
            assert_eq!(url, detail_url("ef-3"));
            assert_eq!(attempts, 2);
        }
        other => panic!("expected a fetch failure, got {:?}", other),
    }
    assert_eq!(browser.resets, 1);

    // Listings fetched before the failure are committed
    let counts = store.count_listings(&table()).unwrap();
    assert_eq!(counts.total, 2);
    assert!(store.get_listing(&table(), "cd-2").unwrap().is_some());

    let runs = store.recent_runs(1).unwrap();
    assert_eq!(runs[0].kind, RunKind::Harvest);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].stats.inserted, 2);
    assert!(runs[0]
        .error_message
        .as_deref()
        .is_some_and(|message| message.contains("div.detail")));
}

#[tokio::test]
async fn test_refresh_updates_and_removes() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();
    let (result, _) = harvest(standard_site(), &mut store, &config).await;
    result.unwrap();

    // ab-1 got cheaper, cd-2 vanished, ef-3 now shows the delisting notice
    let browser = ScriptedBrowser::default()
        .page(
            &detail_url("ab-1"),
            detail_html("450 000 €", Some("50 m²"), "2 pièces", "Paris 11e (75011)"),
        )
        .redirect(&detail_url("ef-3"), "https://listings.test/expiree", notice_html());

    let (result, _) = refresh(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.checked, 3);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.unchanged, 0);

    let updated = store.get_listing(&table(), "ab-1").unwrap().unwrap();
    assert_eq!(updated.features.price, Some(450_000.0));
    assert_eq!(updated.features.size, Some(50.0));
    assert!(updated.last_checked_at.is_some());

    for id in ["cd-2", "ef-3"] {
        let listing = store.get_listing(&table(), id).unwrap().unwrap();
        assert!(listing.removed, "{} should be removed", id);
        assert!(listing.features.rooms.is_some());
    }

    let counts = store.count_listings(&table()).unwrap();
    assert_eq!(counts.active, 1);
    assert_eq!(counts.removed, 2);
    assert_eq!(counts.never_checked, 0);

    // Removed listings are not checked again
    let browser = ScriptedBrowser::default().page(
        &detail_url("ab-1"),
        detail_html("450 000 €", Some("50 m²"), "2 pièces", "Paris 11e (75011)"),
    );
    let (result, browser) = refresh(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.checked, 1);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(browser.navigations, vec![detail_url("ab-1")]);
}

#[tokio::test]
async fn test_refresh_keeps_fields_missing_from_fresh_page() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();
    let (result, _) = harvest(standard_site(), &mut store, &config).await;
    result.unwrap();

    // The size line disappeared and the room count changed
    let browser = standard_site().page(
        &detail_url("ab-1"),
        detail_html("500 000 €", None, "3 pièces", "Paris 11e (75011)"),
    );
    let (result, _) = refresh(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.checked, 3);
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.unchanged, 2);

    let listing = store.get_listing(&table(), "ab-1").unwrap().unwrap();
    assert_eq!(listing.features.size, Some(50.0));
    assert_eq!(listing.features.rooms, Some(3.0));
    assert_eq!(
        listing.features.get(listing_harvest::Feature::PostalCode),
        Some(FieldValue::Text("75011".to_string()))
    );
}

#[tokio::test]
async fn test_refresh_checks_least_recently_checked_first() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();
    let (result, _) = harvest(standard_site(), &mut store, &config).await;
    result.unwrap();

    store.touch_checked(&table(), "ab-1").unwrap();

    let (result, browser) = refresh(standard_site(), &mut store, &config).await;
    result.unwrap();

    assert_eq!(
        browser.navigations,
        vec![detail_url("cd-2"), detail_url("ef-3"), detail_url("ab-1")]
    );
}

#[tokio::test]
async fn test_navigation_error_is_retried_during_refresh() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();
    let (result, _) = harvest(standard_site(), &mut store, &config).await;
    result.unwrap();

    // cd-2 fails to load while ab-1 is still on screen
    let browser = standard_site().failing_once(&detail_url("cd-2"));
    let (result, browser) = refresh(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.checked, 3);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.unchanged, 3);
    assert_eq!(browser.resets, 1);

    let listing = store.get_listing(&table(), "cd-2").unwrap().unwrap();
    assert!(!listing.removed);
    assert!(listing.last_checked_at.is_some());
}

#[tokio::test]
async fn test_navigation_error_is_retried_during_harvest() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let browser = standard_site().failing_once(&detail_url("cd-2"));
    let (result, browser) = harvest(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.inserted, 3);
    assert_eq!(stats.dropped, 0);
    assert_eq!(browser.resets, 1);
    assert!(store.get_listing(&table(), "cd-2").unwrap().is_some());
}

#[tokio::test]
async fn test_refresh_removes_listing_showing_notice_at_same_url() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();
    let (result, _) = harvest(standard_site(), &mut store, &config).await;
    result.unwrap();

    // ef-3 keeps its URL but only shows the delisting notice
    let browser = standard_site().page(&detail_url("ef-3"), notice_html());
    let (result, browser) = refresh(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.checked, 3);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(browser.resets, 0);

    let listing = store.get_listing(&table(), "ef-3").unwrap().unwrap();
    assert!(listing.removed);
    assert!(listing.last_checked_at.is_some());

    // The next refresh moves on without it
    let (result, browser) = refresh(standard_site(), &mut store, &config).await;
    assert_eq!(result.unwrap().checked, 2);
    assert!(!browser.navigations.contains(&detail_url("ef-3")));
}

#[tokio::test]
async fn test_harvest_stores_notice_only_page_as_removed() {
    let config = config();
    let mut store = SqliteStorage::new_in_memory().unwrap();

    let browser = ScriptedBrowser::default()
        .page(&catalog_url(1), catalog_html(&["ab-1"]))
        .redirect(&catalog_url(2), &catalog_url(1), catalog_html(&["ab-1"]))
        .page(&detail_url("ab-1"), notice_html());

    let (result, browser) = harvest(browser, &mut store, &config).await;
    let stats = result.unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.dropped, 0);
    assert_eq!(browser.resets, 0);
    assert!(store.get_listing(&table(), "ab-1").unwrap().unwrap().removed);
}

#[tokio::test]
async fn test_http_harvest_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/achat"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(catalog_html(&["ab-1", "cd-2"])),
        )
        .mount(&mock_server)
        .await;

    // Past the last page the site sends the visitor back to page 1
    Mock::given(method("GET"))
        .and(path("/achat"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/achat?page=1"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/annonce/ab-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_html(
            "500 000 €",
            Some("50 m²"),
            "2 pièces",
            "Paris 11e (75011)",
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/annonce/cd-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_html(
            "320 000 €",
            Some("31 m²"),
            "1 pièce",
            "Paris 18e (75018)",
        )))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("listings.db");

    let content = CONFIG
        .replace("unused.db", &db_path.to_string_lossy())
        .replace("https://listings.test", &base_url)
        .replace("element-timeout-ms = 20", "element-timeout-ms = 200");
    let config = parse_config(&content).unwrap();

    let results = crawler::run(&config, "test-hash", RunKind::Harvest, None, None)
        .await
        .unwrap();

    // Rent has no catalog configured and is skipped
    assert_eq!(results.len(), 1);
    let (run_table, stats) = &results[0];
    assert_eq!(run_table.name(), "testsite_buy");
    assert_eq!(stats.pages_walked, 1);
    assert_eq!(stats.inserted, 2);

    let store = SqliteStorage::new(&db_path).unwrap();
    let listing = store.get_listing(&table(), "cd-2").unwrap().unwrap();
    assert_eq!(listing.url, format!("{}/annonce/cd-2", base_url));
    assert_eq!(listing.features.price, Some(320_000.0));

    let runs = store.recent_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].config_hash, "test-hash");
}

#[tokio::test]
async fn test_run_rejects_missing_catalog() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("listings.db");
    let content = CONFIG.replace("unused.db", &db_path.to_string_lossy());
    let config = parse_config(&content).unwrap();

    let result = crawler::run(
        &config,
        "test-hash",
        RunKind::Harvest,
        None,
        Some(Category::Rent),
    )
    .await;
    assert!(matches!(result, Err(HarvestError::MissingCatalog { .. })));

    let result = crawler::run(&config, "test-hash", RunKind::Refresh, Some("nope"), None).await;
    assert!(matches!(result, Err(HarvestError::UnknownSite(_))));
}
