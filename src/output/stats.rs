//! Statistics generation from the listing database
//!
//! This module provides functionality for extracting and displaying
//! listing and run statistics from the storage layer.

use crate::storage::{ListingCounts, ListingTable, RunRecord, RunStats, RunStatus, Storage};
use crate::Result;

/// Listing counts of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatistics {
    pub table_name: String,
    pub counts: ListingCounts,
}

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Counts for every listing table that exists
    pub tables: Vec<TableStatistics>,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `tables` - Listing tables to count; missing tables are skipped
/// * `run_limit` - How many recent runs to include
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    tables: &[ListingTable],
    run_limit: usize,
) -> Result<HarvestStatistics> {
    let mut table_stats = Vec::new();

    for table in tables {
        if !storage.table_exists(table)? {
            continue;
        }
        table_stats.push(TableStatistics {
            table_name: table.name(),
            counts: storage.count_listings(table)?,
        });
    }

    let recent_runs = storage.recent_runs(run_limit)?;

    Ok(HarvestStatistics {
        tables: table_stats,
        recent_runs,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Listing Statistics ===\n");

    if stats.tables.is_empty() {
        println!("No listing tables yet.");
        println!();
    }

    for table in &stats.tables {
        let counts = &table.counts;
        let removed_rate = if counts.total > 0 {
            (counts.removed as f64 / counts.total as f64) * 100.0
        } else {
            0.0
        };

        println!("{}:", table.table_name);
        println!("  Total listings: {}", counts.total);
        println!("  Active: {}", counts.active);
        println!("  Removed: {} ({:.1}%)", counts.removed, removed_rate);
        println!("  Never re-checked: {}", counts.never_checked);
        println!();
    }

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &stats.recent_runs {
            let status = match run.status {
                RunStatus::Running => "running",
                RunStatus::Completed => "completed",
                RunStatus::Failed => "FAILED",
            };
            println!(
                "  #{} {} {} [{}] started {} - {}",
                run.id,
                run.kind.to_db_string(),
                run.table_name,
                status,
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                summarize_run(&run.stats)
            );
            if let Some(error) = &run.error_message {
                println!("      error: {}", error);
            }
        }
        println!();
    }
}

/// One-line summary of run counters
pub fn summarize_run(stats: &RunStats) -> String {
    if stats.checked > 0 {
        format!(
            "{} checked, {} updated, {} removed, {} unchanged",
            stats.checked, stats.updated, stats.removed, stats.unchanged
        )
    } else {
        format!(
            "{} pages, {} discovered, {} known, {} inserted, {} dropped",
            stats.pages_walked, stats.discovered, stats.known, stats.inserted, stats.dropped
        )
    }
}
