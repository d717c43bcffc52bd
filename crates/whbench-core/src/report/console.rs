use crate::model::{ExecutionRecord, QueryOutcome, RunSummary};
use std::path::Path;

pub fn print_run_header(backend: &str, target: &str, queries: usize) {
    eprintln!("\nRunning {} queries on {} ({})...", queries, backend, target);
}

pub fn print_query_start(index: usize, total: usize, description: &str) {
    eprintln!("[{}/{}] {}", index, total, description);
}

pub fn print_query_result(rec: &ExecutionRecord, outcome: Option<&QueryOutcome>) {
    match &rec.error {
        None => {
            eprintln!("    completed in {:.2}ms", rec.response_time_ms);
            if let Some(row) = outcome.and_then(|o| o.first_row.as_deref()) {
                eprintln!("    First row: {}", row);
            }
            if let Some(t) = rec.stats.as_ref().and_then(|s| s.official_time_ms) {
                eprintln!("    warehouse time: {:.2}ms", t);
            }
        }
        Some(err) => {
            eprintln!("    ❌ failed: {}", err);
        }
    }
}

pub fn print_summary(summary: &RunSummary, output: &Path) {
    eprintln!(
        "\nSummary: {} queries, {} succeeded, {} failed",
        summary.attempted, summary.succeeded, summary.failed
    );
    eprintln!("Results appended to {}", output.display());
    if summary.failed == 0 {
        eprintln!("✅ All queries executed successfully.");
    } else {
        eprintln!("⚠️  Batch completed with failures.");
    }
}
