//! Storage module for persisting listings
//!
//! This module handles all database operations for harvest and refresh runs:
//! - One listing table per site and category, created on demand
//! - Batched inserts keyed by stable identifier
//! - Partial field updates, removal flags and checked timestamps
//! - Run tracking with per-run counters

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::record::Category;
use chrono::{DateTime, Utc};

/// Opens (or creates) a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to open the database or create the schema
pub fn open_storage(path: &std::path::Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Identifies the listing table of one site and category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingTable {
    pub site: String,
    pub category: Category,
}

impl ListingTable {
    pub fn new(site: impl Into<String>, category: Category) -> Self {
        Self {
            site: site.into(),
            category,
        }
    }

    /// Table name, e.g. `bienici_buy`
    pub fn name(&self) -> String {
        format!("{}_{}", self.site, self.category.as_str())
    }

    /// Returns true if the name is safe to splice into SQL
    pub fn is_valid_name(&self) -> bool {
        !self.site.is_empty()
            && self
                .site
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !self.site.starts_with(|c: char| c.is_ascii_digit())
    }
}

/// Listing counts of one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingCounts {
    pub total: u64,
    pub active: u64,
    pub removed: u64,
    pub never_checked: u64,
}

/// Kind of a recorded run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Harvest,
    Refresh,
}

impl RunKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::Refresh => "refresh",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "harvest" => Some(Self::Harvest),
            "refresh" => Some(Self::Refresh),
            _ => None,
        }
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Counters accumulated over one harvest or refresh run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Catalog pages whose tiles were collected
    pub pages_walked: u32,
    /// References collected from the catalog, duplicates included
    pub discovered: u32,
    /// References skipped because the store already knew them
    pub known: u32,
    /// New listings written to the store
    pub inserted: u32,
    /// Detail pages that turned out to be dead links during harvest
    pub dropped: u32,
    /// Stored listings re-checked during refresh
    pub checked: u32,
    /// Listings with at least one changed field
    pub updated: u32,
    /// Listings newly flagged as removed
    pub removed: u32,
    /// Listings re-checked with nothing to change
    pub unchanged: u32,
}

/// Represents a run in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub kind: RunKind,
    pub table_name: String,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub stats: RunStats,
    pub error_message: Option<String>,
}
