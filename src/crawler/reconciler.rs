//! Reconciliation of stored listings against a fresh fetch

use crate::normalize::Normalizer;
use crate::record::{Category, FieldChange, RawFields, StoredRecord};

/// What a refresh fetch produced for a stored listing
#[derive(Debug, Clone)]
pub enum FreshFetch {
    /// The page no longer identifies the listing
    DeadLink {
        /// The page the browser landed on carried the delisting notice
        delisting_marker: bool,
    },

    /// The listing page loaded
    Page(RawFields),
}

/// Why a listing is flagged as removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Dead link without any explicit notice
    Inferred,
    /// The site said the listing is no longer available
    Explicit,
    /// The stored listing was already removed; nothing to do
    AlreadyRemoved,
}

/// Change to apply to a stored listing
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    MarkRemoved(RemovalReason),
    /// Fields whose fresh value differs; may be empty
    UpdateFields(Vec<FieldChange>),
}

/// Decides how a stored listing changes given a fresh fetch
#[derive(Debug, Clone)]
pub struct Reconciler {
    normalizer: Normalizer,
    category: Category,
}

impl Reconciler {
    pub fn new(normalizer: Normalizer, category: Category) -> Self {
        Self {
            normalizer,
            category,
        }
    }

    /// Compares `fresh` with `stored`
    ///
    /// Removal is monotonic and wins over any field change. A fresh null
    /// never overwrites a stored value.
    pub fn reconcile(&self, stored: &StoredRecord, fresh: &FreshFetch) -> Action {
        if stored.removed {
            return Action::MarkRemoved(RemovalReason::AlreadyRemoved);
        }

        let raw = match fresh {
            FreshFetch::DeadLink {
                delisting_marker: true,
            } => return Action::MarkRemoved(RemovalReason::Explicit),
            FreshFetch::DeadLink {
                delisting_marker: false,
            } => return Action::MarkRemoved(RemovalReason::Inferred),
            FreshFetch::Page(raw) if raw.removed => {
                return Action::MarkRemoved(RemovalReason::Explicit)
            }
            FreshFetch::Page(raw) => raw,
        };

        let fresh_record = self
            .normalizer
            .normalize(&stored.reference(), raw, self.category);

        let changes = self
            .category
            .features()
            .into_iter()
            .filter_map(|feature| {
                let new = fresh_record.features.get(feature)?;
                let old = stored.features.get(feature);
                (old.as_ref() != Some(&new)).then_some(FieldChange { feature, old, new })
            })
            .collect();

        Action::UpdateFields(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Feature, FieldValue, ListingFeatures};
    use chrono::Utc;

    fn stored(features: ListingFeatures) -> StoredRecord {
        StoredRecord {
            id: 1,
            stable_id: "ag-1q=".to_string(),
            url: "https://example.com/annonce/ag-1q=".to_string(),
            removed: false,
            features,
            inserted_at: Utc::now(),
            last_checked_at: None,
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Normalizer::new("75"), Category::Buy)
    }

    fn page(values: &[(Feature, &str)]) -> FreshFetch {
        let mut raw = RawFields::new("https://example.com/annonce/ag-1q=");
        for (feature, value) in values {
            raw.insert(*feature, *value);
        }
        FreshFetch::Page(raw)
    }

    #[test]
    fn test_partial_update_keeps_untouched_fields() {
        let record = stored(ListingFeatures {
            size: Some(50.0),
            rooms: Some(2.0),
            ..Default::default()
        });

        // Size has no usable signal, rooms changed
        let fresh = page(&[(Feature::Size, "n/a"), (Feature::Rooms, "3 pièces")]);

        let action = reconciler().reconcile(&record, &fresh);
        assert_eq!(
            action,
            Action::UpdateFields(vec![FieldChange {
                feature: Feature::Rooms,
                old: Some(FieldValue::Float(2.0)),
                new: FieldValue::Float(3.0),
            }])
        );
    }

    #[test]
    fn test_unchanged_fields_yield_empty_update() {
        let record = stored(ListingFeatures {
            price: Some(500_000.0),
            postal_code: Some("75011".to_string()),
            ..Default::default()
        });
        let fresh = page(&[
            (Feature::Price, "500 000 €"),
            (Feature::PostalCode, "Paris 11e 75011"),
        ]);

        assert_eq!(
            reconciler().reconcile(&record, &fresh),
            Action::UpdateFields(vec![])
        );
    }

    #[test]
    fn test_new_value_for_null_field() {
        let record = stored(ListingFeatures::default());
        let fresh = page(&[(Feature::Floor, "2e étage")]);

        match reconciler().reconcile(&record, &fresh) {
            Action::UpdateFields(changes) => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].old, None);
                assert_eq!(changes[0].new, FieldValue::Integer(2));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_dead_link_is_inferred_removal() {
        let record = stored(ListingFeatures::default());
        let fresh = FreshFetch::DeadLink {
            delisting_marker: false,
        };
        assert_eq!(
            reconciler().reconcile(&record, &fresh),
            Action::MarkRemoved(RemovalReason::Inferred)
        );
    }

    #[test]
    fn test_explicit_delisting_wins_over_fields() {
        let record = stored(ListingFeatures {
            price: Some(500_000.0),
            ..Default::default()
        });
        let mut raw = RawFields::new("https://example.com/annonce/ag-1q=");
        raw.removed = true;
        raw.insert(Feature::Price, "1 €");

        assert_eq!(
            reconciler().reconcile(&record, &FreshFetch::Page(raw)),
            Action::MarkRemoved(RemovalReason::Explicit)
        );
        assert_eq!(
            reconciler().reconcile(
                &record,
                &FreshFetch::DeadLink {
                    delisting_marker: true
                }
            ),
            Action::MarkRemoved(RemovalReason::Explicit)
        );
    }

    #[test]
    fn test_removed_record_stays_removed() {
        let mut record = stored(ListingFeatures::default());
        record.removed = true;

        let fresh = page(&[(Feature::Price, "450 000 €")]);
        assert_eq!(
            reconciler().reconcile(&record, &fresh),
            Action::MarkRemoved(RemovalReason::AlreadyRemoved)
        );
    }
}
