//! Markdown summary generation
//!
//! Writes a human-readable summary of a crawl run: record counts, drops per
//! kind and the products whose reviews fell short.

use crate::output::report::{CrawlReport, DropKind};
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of a run
///
/// # Arguments
///
/// * `report` - The finished run report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn write_markdown_summary(report: &CrawlReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run report as markdown
pub fn format_markdown_summary(report: &CrawlReport) -> String {
    let mut md = String::new();

    md.push_str("# Storefront Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    if let Some(finished) = &report.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = report.duration_seconds() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", report.status.to_db_string()));
    md.push_str(&format!("- **Roots**: {}\n\n", report.roots));

    md.push_str("## Pages and Records\n\n");
    md.push_str("| Item | Count |\n");
    md.push_str("|------|-------|\n");
    md.push_str(&format!("| Listing pages | {} |\n", report.listing_pages));
    md.push_str(&format!("| Product pages | {} |\n", report.product_pages));
    md.push_str(&format!("| Review pages | {} |\n", report.review_pages));
    md.push_str(&format!("| Retries | {} |\n", report.retries));
    md.push_str(&format!("| Products emitted | {} |\n", report.products_emitted));
    md.push_str(&format!("| Reviews emitted | {} |\n\n", report.reviews_emitted));

    md.push_str("## Drops\n\n");
    if report.drops.is_empty() {
        md.push_str("Nothing was dropped.\n\n");
    } else {
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for kind in DropKind::ALL {
            let count = report.drops_of(kind);
            if count > 0 {
                md.push_str(&format!("| {} | {} |\n", kind, count));
            }
        }
        md.push('\n');
    }

    if !report.shortfalls.is_empty() {
        md.push_str(&format!(
            "## Review Shortfalls ({} reviews)\n\n",
            report.total_shortfall()
        ));
        md.push_str("| Product | URL | Seen | Expected | Reason |\n");
        md.push_str("|---------|-----|------|----------|--------|\n");
        for shortfall in &report.shortfalls {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                shortfall.product_id,
                shortfall.product_url,
                shortfall.seen,
                shortfall.expected,
                shortfall.reason
            ));
        }
        md.push('\n');
    }

    md
}
