//! Human-readable run and manifest statistics

use crate::crawler::{RunSummary, SourceReport};
use crate::storage::ManifestStats;
use chrono::{DateTime, Utc};

/// Prints the per-source outcome of a run to stdout
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Collection Run ===\n");

    let elapsed = summary.finished_at - summary.started_at;
    println!("Started:  {}", summary.started_at.to_rfc3339());
    println!(
        "Finished: {} ({}s)",
        summary.finished_at.to_rfc3339(),
        elapsed.num_seconds()
    );
    if let Some(filter) = &summary.source_filter {
        println!("Source filter: {}", filter);
    }
    println!();

    for report in &summary.reports {
        println!("{}", source_line(report));
        if let Some(error) = &report.error {
            println!("    error: {}", error);
        }
    }
    if summary.aborted_tasks > 0 {
        println!("{} source task(s) aborted", summary.aborted_tasks);
    }
    if let Some(error) = &summary.manifest_error {
        println!("Manifest not saved: {}", error);
    }

    println!(
        "\nSources: {} ok, {} failed | Items: {} new, {} seen again",
        summary.sources_ok(),
        summary.sources_failed(),
        summary.items_inserted(),
        summary.items_seen_again()
    );
}

fn source_line(report: &SourceReport) -> String {
    let mut line = format!(
        "  [{}] {} ({}): pages {}/{} ok",
        report.phase, report.source_id, report.kind, report.pages_fetched, report.pages_attempted
    );
    if report.pages_skipped > 0 {
        line.push_str(&format!(", {} skipped", report.pages_skipped));
    }
    if let Some(merge) = &report.merge {
        line.push_str(&format!(
            ", items {} new / {} seen / {} retained",
            merge.inserted, merge.seen_again, merge.retained
        ));
    }
    line
}

/// Prints manifest statistics to stdout
pub fn print_manifest_stats(stats: &ManifestStats) {
    println!("=== Manifest Statistics ===\n");
    println!("Tracked urls:  {}", stats.tracked_urls);
    println!("Failing urls:  {}", stats.failing_urls);
    println!("Last full run: {}", fmt_time(stats.last_full_run));
    println!("Runs recorded: {}", stats.runs_recorded);

    if let Some(run) = &stats.last_run {
        println!("\nLast run:");
        println!("  Started:  {}", run.started_at.to_rfc3339());
        println!("  Finished: {}", fmt_time(run.finished_at));
        println!(
            "  Sources:  {} ok, {} failed{}",
            run.sources_ok,
            run.sources_failed,
            run.source_filter
                .as_deref()
                .map(|f| format!(" (filter: {})", f))
                .unwrap_or_default()
        );
        println!(
            "  Items:    {} new, {} seen again",
            run.items_inserted, run.items_seen_again
        );
        println!("  Config:   {}", run.config_hash);
    }
}

fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}
