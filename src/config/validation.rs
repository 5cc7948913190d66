use crate::config::types::{
    BrowserConfig, Config, FetchConfig, FieldRule, HarvestConfig, SiteConfig, StoreConfig,
};
use crate::record::{Category, Feature};
use crate::storage::ListingTable;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_harvest_config(&config.harvest)?;
    validate_browser_config(&config.browser)?;
    validate_store_config(&config.store)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates fetch guard configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be >= 1".to_string(),
        ));
    }

    if config.element_timeout_ms < config.poll_interval_ms {
        return Err(ConfigError::Validation(format!(
            "element-timeout-ms ({}) must be >= poll-interval-ms ({})",
            config.element_timeout_ms, config.poll_interval_ms
        )));
    }

    Ok(())
}

/// Validates harvest limits
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.page_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "page-limit must be >= 1, got {}",
            config.page_limit
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

/// Validates browser backend configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates site entries
fn validate_sites(sites: &[SiteConfig]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "At least one [[site]] must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for site in sites {
        if !names.insert(site.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site name '{}'",
                site.name
            )));
        }
        validate_site(site)?;
    }

    Ok(())
}

/// Validates one site entry
fn validate_site(site: &SiteConfig) -> Result<(), ConfigError> {
    // Site names end up in table names
    if !ListingTable::new(site.name.as_str(), Category::Buy).is_valid_name() {
        return Err(ConfigError::Validation(format!(
            "Site name '{}' must be lowercase letters, digits and underscores, not starting with a digit",
            site.name
        )));
    }

    Url::parse(&site.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", site.base_url, e))
    })?;

    if !site.postal_prefix.chars().all(|c| c.is_ascii_digit()) || site.postal_prefix.len() > 5 {
        return Err(ConfigError::Validation(format!(
            "postal-prefix of site '{}' must be at most 5 digits, got '{}'",
            site.name, site.postal_prefix
        )));
    }

    if let Some(param) = &site.page_param {
        if param.is_empty() {
            return Err(ConfigError::Validation(format!(
                "page-param of site '{}' cannot be empty",
                site.name
            )));
        }
    }

    if let Some(pattern) = &site.id_pattern {
        validate_id_pattern(pattern)?;
    }

    validate_selector(&site.tile_selector)?;
    validate_selector(&site.detail_selector)?;

    match (&site.delisted_selector, &site.delisted_text) {
        (Some(selector), _) => validate_selector(selector)?,
        (None, Some(_)) => {
            return Err(ConfigError::Validation(format!(
                "delisted-text of site '{}' requires delisted-selector",
                site.name
            )));
        }
        (None, None) => {}
    }

    let templates: Vec<&str> = Category::all()
        .iter()
        .filter_map(|category| site.catalog_template(*category))
        .collect();
    if templates.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}' must define at least one catalog template",
            site.name
        )));
    }
    for template in templates {
        validate_catalog_template(template)?;
    }

    for (name, rule) in &site.fields {
        validate_field_rule(name, rule)?;
    }

    Ok(())
}

/// Validates a catalog URL template
fn validate_catalog_template(template: &str) -> Result<(), ConfigError> {
    if !template.contains("{page}") {
        return Err(ConfigError::Validation(format!(
            "Catalog template '{}' must contain {{page}}",
            template
        )));
    }

    let sample = template.replace("{page}", "1");
    Url::parse(&sample).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid catalog template '{}': {}", template, e))
    })?;

    Ok(())
}

/// Validates a field extraction rule and the feature it names
fn validate_field_rule(name: &str, rule: &FieldRule) -> Result<(), ConfigError> {
    if Feature::from_name(name).is_none() {
        return Err(ConfigError::Validation(format!(
            "Unknown field '{}'",
            name
        )));
    }

    validate_selector(&rule.selector)
}

/// Validates a CSS selector
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidSelector(selector.to_string()))
}

/// Validates a stable-id pattern; it must capture the identifier
fn validate_id_pattern(pattern: &str) -> Result<(), ConfigError> {
    let regex = Regex::new(pattern)
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))?;

    if regex.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "'{}' must contain a capture group",
            pattern
        )));
    }

    Ok(())
}
