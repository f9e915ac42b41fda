//! Run summary printed at the end of a crawl

use crate::crawler::{RunMode, RunReport, RunStatus};
use std::fmt::Write;

/// Number of failed ids listed before the summary truncates
const MAX_LISTED_FAILURES: usize = 20;

/// Renders the summary of a finished run
pub fn format_summary(report: &RunReport) -> String {
    let mut out = String::new();
    // writing to a String cannot fail
    let _ = write_summary(&mut out, report);
    out
}

/// Prints the run summary to stdout
pub fn print_summary(report: &RunReport) {
    print!("{}", format_summary(report));
}

fn write_summary(out: &mut String, report: &RunReport) -> std::fmt::Result {
    writeln!(out, "=== Crawl Summary ===\n")?;

    writeln!(out, "Run:")?;
    writeln!(out, "  Target: {}", report.spec)?;
    if let Some(id) = report.run_id {
        writeln!(out, "  Ledger id: {}", id)?;
    }
    writeln!(out, "  Status: {}", report.status)?;
    writeln!(out, "  Elapsed: {:.1}s", report.elapsed.as_secs_f64())?;
    writeln!(out)?;

    writeln!(out, "Progress:")?;
    if matches!(report.spec.mode(), RunMode::PageRange { .. }) {
        match (report.pages_fetched.first(), report.pages_fetched.last()) {
            (Some(first), Some(last)) => writeln!(
                out,
                "  Pages fetched: {} ({} to {})",
                report.pages_fetched.len(),
                first,
                last
            )?,
            _ => writeln!(out, "  Pages fetched: 0")?,
        }
    }
    writeln!(out, "  Items written: {}", report.items_written)?;
    writeln!(out, "  Items failed: {}", report.items_failed)?;
    writeln!(out, "  Peak busy workers: {}", report.peak_busy)?;
    writeln!(out, "  Rate: {:.2} items/s", report.items_per_second())?;
    writeln!(out)?;

    if !report.failed_ids.is_empty() {
        writeln!(out, "Failed Items ({}):", report.failed_ids.len())?;
        for id in report.failed_ids.iter().take(MAX_LISTED_FAILURES) {
            writeln!(out, "  - {}", id)?;
        }
        if report.failed_ids.len() > MAX_LISTED_FAILURES {
            writeln!(
                out,
                "  ... and {} more",
                report.failed_ids.len() - MAX_LISTED_FAILURES
            )?;
        }
        writeln!(out)?;
    }

    let total = report.items_written + report.items_failed;
    let success_rate = if total > 0 {
        (report.items_written as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    writeln!(
        out,
        "Success Rate: {:.1}% ({} / {} items stored)",
        success_rate, report.items_written, total
    )?;

    if let RunStatus::Aborted(reason) = &report.status {
        writeln!(out, "\nThe run was aborted: {}", reason)?;
        writeln!(out, "Re-running the same range is safe, every sink upserts.")?;
    }

    Ok(())
}
