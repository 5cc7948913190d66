//! Field normalization
//!
//! Turns the raw strings a site adapter extracts into typed feature values.
//! The cleaning functions themselves live in `fields` and are pure; the
//! [`Normalizer`] applies the right one to each feature of a category and
//! nulls out values that make no sense.

mod fields;

pub use fields::{
    decimal_comma, floor_number, numeric, postal_code, price_range, scale_if_abbreviated, text,
};

use crate::record::{
    Category, Feature, FieldValue, ItemReference, ListingFeatures, NormalizedRecord, RawFields,
};

/// Applies per-feature cleaning rules to raw adapter output
#[derive(Debug, Clone)]
pub struct Normalizer {
    postal_prefix: String,
}

impl Normalizer {
    /// Creates a normalizer accepting postal codes that start with `postal_prefix`
    pub fn new(postal_prefix: impl Into<String>) -> Self {
        Self {
            postal_prefix: postal_prefix.into(),
        }
    }

    /// Cleans a single raw value for `feature`
    pub fn clean(&self, feature: Feature, raw: &str) -> Option<FieldValue> {
        match feature {
            Feature::Price => price_range(raw).map(FieldValue::Float),
            Feature::PricePerSqm => {
                scale_if_abbreviated(numeric(&decimal_comma(raw)), raw).map(FieldValue::Float)
            }
            Feature::Size => numeric(&decimal_comma(raw)).map(FieldValue::Float),
            Feature::MonthlyRent | Feature::Rooms | Feature::Bedrooms | Feature::Bathrooms => {
                numeric(raw).map(FieldValue::Float)
            }
            Feature::Floor => floor_number(raw).map(FieldValue::Integer),
            Feature::Agent => text(raw).map(FieldValue::Text),
            Feature::PostalCode => postal_code(raw, &self.postal_prefix).map(FieldValue::Text),
        }
    }

    /// Builds a typed record from raw fields
    ///
    /// Only the features of `category` are considered. A value that cleans to
    /// something nonsensical is logged and stored as null so one bad field
    /// never discards an otherwise good record.
    pub fn normalize(
        &self,
        reference: &ItemReference,
        raw: &RawFields,
        category: Category,
    ) -> NormalizedRecord {
        let mut features = ListingFeatures::default();

        for feature in category.features() {
            let Some(raw_value) = raw.get(feature) else {
                continue;
            };

            let value = self
                .clean(feature, raw_value)
                .filter(|value| is_plausible(feature, value));

            if value.is_none() && !raw_value.trim().is_empty() {
                tracing::warn!(
                    url = %reference.url,
                    field = %feature,
                    raw = raw_value,
                    "Discarding unusable field value"
                );
            }

            features.set(feature, value);
        }

        NormalizedRecord {
            stable_id: reference.stable_id.clone(),
            url: reference.url.clone(),
            removed: raw.removed,
            features,
        }
    }
}

/// Rejects values no real listing can have
fn is_plausible(feature: Feature, value: &FieldValue) -> bool {
    match (feature, value) {
        (_, FieldValue::Float(v)) => v.is_finite() && *v > 0.0,
        (Feature::Floor, FieldValue::Integer(v)) => (0..=300).contains(v),
        (_, FieldValue::Integer(_)) => true,
        (_, FieldValue::Text(s)) => !s.is_empty(),
    }
}
