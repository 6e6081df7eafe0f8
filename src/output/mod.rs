//! Console output for the CLI
//!
//! Prints mirror statistics, full-sync reports, routed responses and the
//! activity log.

pub mod stats;

pub use stats::{load_statistics, print_statistics, SyncStatistics};

use crate::router::RouteResponse;
use crate::storage::StoredLog;
use crate::sync::FullSyncReport;

/// Prints a per-phase table for a finished full sync
pub fn print_report(report: &FullSyncReport) {
    println!("=== Full Sync Report ===\n");
    println!(
        "  {:<10} {:>9} {:>9} {:>7} {:>9} {:>9}",
        "phase", "submitted", "succeeded", "failed", "records", "seconds"
    );
    for phase in &report.phases {
        println!(
            "  {:<10} {:>9} {:>9} {:>7} {:>9} {:>9.1}",
            phase.name,
            phase.submitted,
            phase.succeeded,
            phase.failed,
            phase.records,
            phase.elapsed.as_secs_f64()
        );
    }
    println!();
    println!(
        "Finished in {:.1}s with {} failed tasks",
        report.elapsed.as_secs_f64(),
        report.total_failed()
    );
}

/// Prints a routed response, one line per summary
pub fn print_response(response: &RouteResponse) {
    println!("Status: {} ({})", response.status.as_str(), response.message);

    for centre in &response.data {
        let district = centre.centre.district.as_deref().unwrap_or("-");
        println!("\n{} [{}]", centre.centre.name, district);

        for summary in &centre.summaries {
            println!(
                "  {}  {:<8} farmers {:>4}  qty {:>10.2}  amount {:>12.2}",
                summary.date,
                summary.data_state.to_db_string(),
                summary.farmer_count,
                summary.quantity,
                summary.amount
            );
        }

        if !centre.transactions.is_empty() {
            println!("  Transactions:");
            for tx in &centre.transactions {
                println!(
                    "    {}  {:<12} {:<24} {:<16} {:>8.2} {:>10.2}  {}",
                    tx.date,
                    tx.farmer_id,
                    tx.farmer_name,
                    tx.village,
                    tx.quantity,
                    tx.amount,
                    tx.transaction_time
                );
            }
        }
    }

    println!(
        "\n{} summaries, {} transactions",
        response.summary_count(),
        response.transaction_count()
    );
}

/// Prints activity log records, newest first
pub fn print_logs(logs: &[StoredLog]) {
    if logs.is_empty() {
        println!("No activity logs recorded");
        return;
    }

    for log in logs {
        print!(
            "{} [{:<7}] {}: {}",
            log.timestamp,
            log.level.to_db_string(),
            log.component,
            log.message
        );
        match &log.details {
            Some(details) => println!(" ({})", details),
            None => println!(),
        }
    }
}
