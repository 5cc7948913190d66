//! Filtering of already-known listings

use crate::record::ItemReference;
use std::collections::HashSet;

/// Result of [`filter_new`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// References to fetch, in discovery order, one per stable id
    pub fresh: Vec<ItemReference>,
    /// References dropped because the store already has their id
    pub known: usize,
    /// References dropped because their id appeared earlier in the input
    pub repeated: usize,
}

/// Removes references whose stable id is stored or already seen
///
/// `existing_ids` is read from the store once per run, before any detail
/// fetch.
pub fn filter_new(references: Vec<ItemReference>, existing_ids: &HashSet<String>) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let mut seen = HashSet::new();

    for reference in references {
        if existing_ids.contains(&reference.stable_id) {
            outcome.known += 1;
        } else if !seen.insert(reference.stable_id.clone()) {
            outcome.repeated += 1;
        } else {
            outcome.fresh.push(reference);
        }
    }

    tracing::info!(
        "{} new references ({} already stored, {} repeated)",
        outcome.fresh.len(),
        outcome.known,
        outcome.repeated
    );

    outcome
}
