//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::record::{
    Category, FeatureKind, FieldChange, FieldValue, ListingFeatures, NormalizedRecord,
    StoredRecord,
};
use crate::storage::schema::{
    initialize_schema, listing_select_list, listing_table_sql, BASE_COLUMNS,
};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ListingCounts, ListingTable, RunKind, RunRecord, RunStats, RunStatus};
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const RUN_COLUMNS: &str = "id, kind, table_name, config_hash, started_at, finished_at, status, \
     pages_walked, discovered, known, inserted, dropped, checked, updated, removed, unchanged, \
     error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn insert_record(
        conn: &Connection,
        name: &str,
        category: Category,
        record: &NormalizedRecord,
    ) -> StorageResult<bool> {
        let features = category.features();
        let columns: Vec<&str> = ["stable_id", "url", "removed", "inserted_at"]
            .into_iter()
            .chain(features.iter().map(|f| f.column()))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

        let sql = format!(
            "INSERT OR IGNORE INTO \"{}\" ({}) VALUES ({})",
            name,
            columns.join(", "),
            placeholders.join(", ")
        );

        let now = Utc::now();
        let values: Vec<Option<FieldValue>> =
            features.iter().map(|f| record.features.get(*f)).collect();

        let mut bound: Vec<&dyn ToSql> = vec![
            &record.stable_id as &dyn ToSql,
            &record.url,
            &record.removed,
            &now,
        ];
        bound.extend(values.iter().map(|v| v as &dyn ToSql));

        let written = conn.execute(&sql, bound.as_slice())?;
        Ok(written > 0)
    }

    fn listing_exists(&self, name: &str, stable_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT id FROM \"{}\" WHERE stable_id = ?1", name),
                params![stable_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Returns the table name after checking it is safe to quote into SQL
fn checked_name(table: &ListingTable) -> StorageResult<String> {
    if table.is_valid_name() {
        Ok(table.name())
    } else {
        Err(StorageError::InvalidTable(table.name()))
    }
}

/// Maps a listing row selected with [`listing_select_list`]
fn listing_from_row(row: &Row<'_>, category: Category) -> rusqlite::Result<StoredRecord> {
    let mut features = ListingFeatures::default();

    for (offset, feature) in category.features().into_iter().enumerate() {
        let idx = BASE_COLUMNS.len() + offset;
        let value = match feature.kind() {
            FeatureKind::Float => row.get::<_, Option<f64>>(idx)?.map(FieldValue::Float),
            FeatureKind::Integer => row.get::<_, Option<i64>>(idx)?.map(FieldValue::Integer),
            FeatureKind::Text => row.get::<_, Option<String>>(idx)?.map(FieldValue::Text),
        };
        features.set(feature, value);
    }

    Ok(StoredRecord {
        id: row.get(0)?,
        stable_id: row.get(1)?,
        url: row.get(2)?,
        removed: row.get(3)?,
        inserted_at: row.get(4)?,
        last_checked_at: row.get(5)?,
        features,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        kind: RunKind::from_db_string(&row.get::<_, String>(1)?).unwrap_or(RunKind::Harvest),
        table_name: row.get(2)?,
        config_hash: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(RunStatus::Running),
        stats: RunStats {
            pages_walked: row.get(7)?,
            discovered: row.get(8)?,
            known: row.get(9)?,
            inserted: row.get(10)?,
            dropped: row.get(11)?,
            checked: row.get(12)?,
            updated: row.get(13)?,
            removed: row.get(14)?,
            unchanged: row.get(15)?,
        },
        error_message: row.get(16)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Table Management =====

    fn create_if_missing(&mut self, table: &ListingTable) -> StorageResult<()> {
        checked_name(table)?;
        self.conn.execute_batch(&listing_table_sql(table))?;
        Ok(())
    }

    fn table_exists(&self, table: &ListingTable) -> StorageResult<bool> {
        let name = checked_name(table)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ===== Listing Management =====

    fn existing_stable_ids(&self, table: &ListingTable) -> StorageResult<HashSet<String>> {
        let name = checked_name(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT stable_id FROM \"{}\"", name))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(ids)
    }

    fn insert_if_absent(
        &mut self,
        table: &ListingTable,
        record: &NormalizedRecord,
    ) -> StorageResult<bool> {
        let name = checked_name(table)?;
        Self::insert_record(&self.conn, &name, table.category, record)
    }

    fn insert_batch(
        &mut self,
        table: &ListingTable,
        records: &[NormalizedRecord],
    ) -> StorageResult<usize> {
        let name = checked_name(table)?;
        let tx = self.conn.transaction()?;

        let mut written = 0;
        for record in records {
            if Self::insert_record(&tx, &name, table.category, record)? {
                written += 1;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    fn update_fields(
        &mut self,
        table: &ListingTable,
        stable_id: &str,
        changes: &[FieldChange],
    ) -> StorageResult<()> {
        let name = checked_name(table)?;
        if changes.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = changes
            .iter()
            .enumerate()
            .map(|(i, change)| format!("{} = ?{}", change.feature.column(), i + 1))
            .collect();

        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE stable_id = ?{} AND removed = 0",
            name,
            assignments.join(", "),
            changes.len() + 1
        );

        let mut bound: Vec<&dyn ToSql> = changes.iter().map(|c| &c.new as &dyn ToSql).collect();
        bound.push(&stable_id);

        let updated = self.conn.execute(&sql, bound.as_slice())?;
        if updated == 0 && !self.listing_exists(&name, stable_id)? {
            return Err(StorageError::ListingNotFound(stable_id.to_string()));
        }

        Ok(())
    }

    fn mark_removed(&mut self, table: &ListingTable, stable_id: &str) -> StorageResult<bool> {
        let name = checked_name(table)?;
        let changed = self.conn.execute(
            &format!(
                "UPDATE \"{}\" SET removed = 1 WHERE stable_id = ?1 AND removed = 0",
                name
            ),
            params![stable_id],
        )?;

        if changed == 0 && !self.listing_exists(&name, stable_id)? {
            return Err(StorageError::ListingNotFound(stable_id.to_string()));
        }

        Ok(changed > 0)
    }

    fn touch_checked(&mut self, table: &ListingTable, stable_id: &str) -> StorageResult<()> {
        let name = checked_name(table)?;
        let changed = self.conn.execute(
            &format!(
                "UPDATE \"{}\" SET last_checked_at = ?1 WHERE stable_id = ?2",
                name
            ),
            params![Utc::now(), stable_id],
        )?;

        if changed == 0 {
            return Err(StorageError::ListingNotFound(stable_id.to_string()));
        }

        Ok(())
    }

    fn pending_for_refresh(&self, table: &ListingTable) -> StorageResult<Vec<StoredRecord>> {
        let name = checked_name(table)?;
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE removed = 0
             ORDER BY last_checked_at IS NOT NULL, last_checked_at ASC, inserted_at ASC, id ASC",
            listing_select_list(table.category),
            name
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], |row| listing_from_row(row, table.category))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn get_listing(
        &self,
        table: &ListingTable,
        stable_id: &str,
    ) -> StorageResult<Option<StoredRecord>> {
        let name = checked_name(table)?;
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE stable_id = ?1",
            listing_select_list(table.category),
            name
        );

        let record = self
            .conn
            .query_row(&sql, params![stable_id], |row| {
                listing_from_row(row, table.category)
            })
            .optional()?;

        Ok(record)
    }

    fn count_listings(&self, table: &ListingTable) -> StorageResult<ListingCounts> {
        let name = checked_name(table)?;
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(removed = 0), 0),
                    COALESCE(SUM(removed = 1), 0),
                    COALESCE(SUM(last_checked_at IS NULL), 0)
             FROM \"{}\"",
            name
        );

        let counts = self.conn.query_row(&sql, [], |row| {
            Ok(ListingCounts {
                total: row.get::<_, i64>(0)? as u64,
                active: row.get::<_, i64>(1)? as u64,
                removed: row.get::<_, i64>(2)? as u64,
                never_checked: row.get::<_, i64>(3)? as u64,
            })
        })?;

        Ok(counts)
    }

    // ===== Run Management =====

    fn create_run(
        &mut self,
        kind: RunKind,
        table: &ListingTable,
        config_hash: &str,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (kind, table_name, config_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                kind.to_db_string(),
                table.name(),
                config_hash,
                Utc::now(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        stats: &RunStats,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_walked = ?3, discovered = ?4,
                 known = ?5, inserted = ?6, dropped = ?7, checked = ?8, updated = ?9,
                 removed = ?10, unchanged = ?11, error_message = ?12
             WHERE id = ?13",
            params![
                status.to_db_string(),
                Utc::now(),
                stats.pages_walked,
                stats.discovered,
                stats.known,
                stats.inserted,
                stats.dropped,
                stats.checked,
                stats.updated,
                stats.removed,
                stats.unchanged,
                error_message,
                run_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }

        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?;

        run.ok_or(StorageError::RunNotFound(run_id))
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}
