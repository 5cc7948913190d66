//! Pure field cleaning functions
//!
//! Every function here is total: malformed input yields `None`, never a
//! panic or an error. Outputs depend only on the input text, which keeps
//! reconciliation comparisons stable across runs.

use regex::Regex;
use std::sync::LazyLock;

static RANGE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:-|–|\bà\b|\bto\b)\s*").expect("valid regex"));

static FLOOR_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)(?:er|ère|re|ème|eme|e|st|nd|rd|th)\b").expect("valid regex")
});

static FIVE_DIGIT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5}\b").expect("valid regex"));

static THOUSANDS_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\s*[kK]").expect("valid regex"));

/// Extracts a number from noisy text
///
/// Drops every character that is not an ASCII digit or a dot (this removes
/// spaces, non-breaking spaces, currency and unit symbols), then parses what
/// remains.
///
/// # Examples
///
/// ```
/// use listing_harvest::normalize::numeric;
///
/// assert_eq!(numeric("1\u{a0}250 000 €"), Some(1_250_000.0));
/// assert_eq!(numeric("3 pièces"), Some(3.0));
/// assert_eq!(numeric("n/a"), None);
/// ```
pub fn numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    cleaned.parse::<f64>().ok()
}

/// Replaces a decimal comma with a dot ("45,5 m²" -> "45.5 m²")
pub fn decimal_comma(raw: &str) -> String {
    raw.replace(',', ".")
}

/// Averages a price range such as "495 000 à 2 100 000 €" or "500-1000"
///
/// Each side of the range is cleaned with [`numeric`]; non-positive sides
/// are discarded. Text without a separator is treated as a single value.
/// Returns `None` when no side yields a positive number.
pub fn price_range(raw: &str) -> Option<f64> {
    let values: Vec<f64> = RANGE_SEPARATOR
        .split(raw)
        .filter_map(numeric)
        .filter(|v| *v > 0.0)
        .collect();

    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Extracts the first 5-digit postal code starting with `prefix`
pub fn postal_code(raw: &str, prefix: &str) -> Option<String> {
    FIVE_DIGIT_WORD
        .find_iter(raw)
        .map(|m| m.as_str())
        .find(|code| code.starts_with(prefix))
        .map(str::to_string)
}

/// Extracts the first integer immediately followed by an ordinal marker
///
/// "3e étage (sur 6)" gives 3, "3rd floor of 6" gives 3.
pub fn floor_number(raw: &str) -> Option<i64> {
    FLOOR_ORDINAL
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Multiplies `value` by 1000 if `raw` carries a thousands marker ("10,5 k€")
pub fn scale_if_abbreviated(value: Option<f64>, raw: &str) -> Option<f64> {
    let value = value?;
    if THOUSANDS_MARKER.is_match(raw) {
        Some(value * 1000.0)
    } else {
        Some(value)
    }
}

/// Collapses whitespace in free text; empty text becomes `None`
pub fn text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
