//! Listing records at each stage of the pipeline

use crate::record::{Feature, FieldValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A listing locator discovered while walking a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReference {
    /// Absolute URL of the detail page
    pub url: String,

    /// Deterministic identifier derived from the URL by the site adapter
    pub stable_id: String,
}

impl ItemReference {
    pub fn new(url: impl Into<String>, stable_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stable_id: stable_id.into(),
        }
    }

    /// Returns true if `current_url` still points at this item
    pub fn matches_url(&self, current_url: &str) -> bool {
        current_url.contains(&self.stable_id)
    }
}

/// Raw, unnormalized field text extracted from one detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    /// URL the fields were extracted from
    pub url: String,

    /// The page carried an explicit "no longer available" notice
    pub removed: bool,

    /// Raw text per feature; a missing key means the page gave no signal
    pub values: BTreeMap<Feature, String>,
}

impl RawFields {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, feature: Feature) -> Option<&str> {
        self.values.get(&feature).map(String::as_str)
    }

    pub fn insert(&mut self, feature: Feature, raw: impl Into<String>) {
        self.values.insert(feature, raw.into());
    }
}

/// Typed feature values of a listing; `None` is an explicit null
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFeatures {
    pub price: Option<f64>,
    pub price_per_sqm: Option<f64>,
    pub monthly_rent: Option<f64>,
    pub size: Option<f64>,
    pub rooms: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub floor: Option<i64>,
    pub agent: Option<String>,
    pub postal_code: Option<String>,
}

impl ListingFeatures {
    pub fn get(&self, feature: Feature) -> Option<FieldValue> {
        match feature {
            Feature::Price => self.price.map(FieldValue::Float),
            Feature::PricePerSqm => self.price_per_sqm.map(FieldValue::Float),
            Feature::MonthlyRent => self.monthly_rent.map(FieldValue::Float),
            Feature::Size => self.size.map(FieldValue::Float),
            Feature::Rooms => self.rooms.map(FieldValue::Float),
            Feature::Bedrooms => self.bedrooms.map(FieldValue::Float),
            Feature::Bathrooms => self.bathrooms.map(FieldValue::Float),
            Feature::Floor => self.floor.map(FieldValue::Integer),
            Feature::Agent => self.agent.clone().map(FieldValue::Text),
            Feature::PostalCode => self.postal_code.clone().map(FieldValue::Text),
        }
    }

    /// Sets a feature, returning false if the value kind does not fit the feature
    pub fn set(&mut self, feature: Feature, value: Option<FieldValue>) -> bool {
        match feature {
            Feature::Price => set_float(&mut self.price, value),
            Feature::PricePerSqm => set_float(&mut self.price_per_sqm, value),
            Feature::MonthlyRent => set_float(&mut self.monthly_rent, value),
            Feature::Size => set_float(&mut self.size, value),
            Feature::Rooms => set_float(&mut self.rooms, value),
            Feature::Bedrooms => set_float(&mut self.bedrooms, value),
            Feature::Bathrooms => set_float(&mut self.bathrooms, value),
            Feature::Floor => match value {
                Some(FieldValue::Integer(v)) => {
                    self.floor = Some(v);
                    true
                }
                None => {
                    self.floor = None;
                    true
                }
                Some(_) => false,
            },
            Feature::Agent => set_text(&mut self.agent, value),
            Feature::PostalCode => set_text(&mut self.postal_code, value),
        }
    }
}

fn set_float(slot: &mut Option<f64>, value: Option<FieldValue>) -> bool {
    match value {
        Some(FieldValue::Float(v)) => *slot = Some(v),
        None => *slot = None,
        Some(_) => return false,
    }
    true
}

fn set_text(slot: &mut Option<String>, value: Option<FieldValue>) -> bool {
    match value {
        Some(FieldValue::Text(v)) => *slot = Some(v),
        None => *slot = None,
        Some(_) => return false,
    }
    true
}

/// A listing after normalization, ready to be stored or compared
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub stable_id: String,
    pub url: String,
    pub removed: bool,
    pub features: ListingFeatures,
}

/// One feature whose fresh value differs from the stored one
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub feature: Feature,
    pub old: Option<FieldValue>,
    pub new: FieldValue,
}

/// A listing as persisted in the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Store-assigned primary key
    pub id: i64,
    pub stable_id: String,
    pub url: String,
    pub removed: bool,
    pub features: ListingFeatures,
    pub inserted_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Rebuilds the reference used to re-fetch this listing
    pub fn reference(&self) -> ItemReference {
        ItemReference::new(self.url.clone(), self.stable_id.clone())
    }
}
