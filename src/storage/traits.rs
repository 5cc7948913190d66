//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::record::{FieldChange, NormalizedRecord, StoredRecord};
use crate::storage::{ListingCounts, ListingTable, RunKind, RunRecord, RunStats, RunStatus};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Listing not found: {0}")]
    ListingNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by a crawl session.
/// Every listing operation is scoped to one [`ListingTable`].
pub trait Storage {
    // ===== Table Management =====

    /// Creates the listing table if it does not exist yet
    fn create_if_missing(&mut self, table: &ListingTable) -> StorageResult<()>;

    /// Returns true if the listing table exists
    fn table_exists(&self, table: &ListingTable) -> StorageResult<bool>;

    // ===== Listing Management =====

    /// Returns every stable identifier already stored, removed ones included
    fn existing_stable_ids(&self, table: &ListingTable) -> StorageResult<HashSet<String>>;

    /// Inserts a listing unless its stable identifier is already present
    ///
    /// # Returns
    ///
    /// `true` if a row was written
    fn insert_if_absent(
        &mut self,
        table: &ListingTable,
        record: &NormalizedRecord,
    ) -> StorageResult<bool>;

    /// Inserts a batch of listings in a single transaction
    ///
    /// Records whose stable identifier is already stored are skipped.
    ///
    /// # Returns
    ///
    /// The number of rows written
    fn insert_batch(
        &mut self,
        table: &ListingTable,
        records: &[NormalizedRecord],
    ) -> StorageResult<usize>;

    /// Writes the new value of each changed feature
    ///
    /// Removed listings are never updated. An empty change list is a no-op.
    fn update_fields(
        &mut self,
        table: &ListingTable,
        stable_id: &str,
        changes: &[FieldChange],
    ) -> StorageResult<()>;

    /// Flags a listing as removed
    ///
    /// # Returns
    ///
    /// `true` if the flag changed, `false` if it was already set
    fn mark_removed(&mut self, table: &ListingTable, stable_id: &str) -> StorageResult<bool>;

    /// Sets the last checked timestamp of a listing to now
    fn touch_checked(&mut self, table: &ListingTable, stable_id: &str) -> StorageResult<()>;

    /// Lists active listings, least recently checked first
    ///
    /// Listings never checked come first, then by check time, insertion
    /// time and id.
    fn pending_for_refresh(&self, table: &ListingTable) -> StorageResult<Vec<StoredRecord>>;

    /// Gets a listing by stable identifier
    fn get_listing(
        &self,
        table: &ListingTable,
        stable_id: &str,
    ) -> StorageResult<Option<StoredRecord>>;

    /// Counts listings by state
    fn count_listings(&self, table: &ListingTable) -> StorageResult<ListingCounts>;

    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(
        &mut self,
        kind: RunKind,
        table: &ListingTable,
        config_hash: &str,
    ) -> StorageResult<i64>;

    /// Records the final status and counters of a run
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        stats: &RunStats,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;
}
