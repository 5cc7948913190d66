//! Database schema definitions
//!
//! The run ledger has a fixed schema. Listing tables are created on demand,
//! one per site and category, with the feature columns of that category.

use crate::record::Category;
use crate::storage::ListingTable;

/// SQL schema for the run ledger
pub const SCHEMA_SQL: &str = r#"
-- Track harvest and refresh runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    table_name TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    pages_walked INTEGER NOT NULL DEFAULT 0,
    discovered INTEGER NOT NULL DEFAULT 0,
    known INTEGER NOT NULL DEFAULT 0,
    inserted INTEGER NOT NULL DEFAULT 0,
    dropped INTEGER NOT NULL DEFAULT 0,
    checked INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    removed INTEGER NOT NULL DEFAULT 0,
    unchanged INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_table ON runs(table_name);
"#;

/// Columns every listing table starts with, in row order
pub const BASE_COLUMNS: [&str; 6] = [
    "id",
    "stable_id",
    "url",
    "removed",
    "inserted_at",
    "last_checked_at",
];

/// Builds the DDL of a listing table
///
/// The caller must have validated the table name.
pub fn listing_table_sql(table: &ListingTable) -> String {
    let name = table.name();
    let feature_columns: String = table
        .category
        .features()
        .iter()
        .map(|f| format!(",\n    {} {}", f.column(), f.kind().sql_type()))
        .collect();

    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{name}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stable_id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    removed INTEGER NOT NULL DEFAULT 0,
    inserted_at TEXT NOT NULL,
    last_checked_at TEXT{feature_columns}
);

CREATE INDEX IF NOT EXISTS "idx_{name}_refresh" ON "{name}"(removed, last_checked_at);
"#
    )
}

/// Comma-separated select list of a category's listing columns
pub fn listing_select_list(category: Category) -> String {
    BASE_COLUMNS
        .iter()
        .copied()
        .chain(category.features().iter().map(|f| f.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Initializes the run ledger schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
