//! Output module for run summaries and statistics
//!
//! This module handles:
//! - Loading per-table listing counts and the run ledger
//! - Printing them for the `stats` command
//! - Summarizing the counters of finished runs

pub mod stats;

pub use stats::{
    load_statistics, print_statistics, summarize_run, HarvestStatistics, TableStatistics,
};

use crate::storage::{ListingTable, RunStats};

/// Prints the outcome of the runs of one invocation
pub fn print_run_results(results: &[(ListingTable, RunStats)]) {
    if results.is_empty() {
        println!("Nothing to do: no catalog configured for the selection.");
        return;
    }

    for (table, stats) in results {
        println!("{}: {}", table.name(), summarize_run(stats));
    }
}
