//! Console statistics
//!
//! Prints a finished run's report, or the record counts already stored in a
//! crawl database.

use crate::output::report::{CrawlReport, DropKind};
use crate::storage::StoredCounts;

/// Prints a run report to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Overview:");
    println!("  Status: {}", report.status.to_db_string());
    if let Some(duration) = report.duration_seconds() {
        println!("  Duration: {}s", duration);
    }
    println!("  Roots: {}", report.roots);
    println!("  Listing pages: {}", report.listing_pages);
    println!("  Product pages: {}", report.product_pages);
    println!("  Review pages: {}", report.review_pages);
    println!("  Retries: {}", report.retries);
    println!();

    println!("Records:");
    println!("  Products: {}", report.products_emitted);
    println!("  Reviews: {}", report.reviews_emitted);
    println!();

    if !report.drops.is_empty() {
        println!("Drops:");
        for kind in DropKind::ALL {
            let count = report.drops_of(kind);
            if count > 0 {
                println!("  {}: {}", kind, count);
            }
        }
        println!();
    }

    if !report.shortfalls.is_empty() {
        println!(
            "Review Shortfalls ({} products, {} reviews):",
            report.shortfalls.len(),
            report.total_shortfall()
        );
        for shortfall in report.shortfalls.iter().take(20) {
            println!(
                "  - product {} ({}): {}/{} ({})",
                shortfall.product_id,
                shortfall.product_url,
                shortfall.seen,
                shortfall.expected,
                shortfall.reason
            );
        }
        if report.shortfalls.len() > 20 {
            println!("  ... and {} more", report.shortfalls.len() - 20);
        }
        println!();
    }
}

/// Prints the counts stored in a crawl database
pub fn print_stored_counts(counts: &StoredCounts) {
    println!("=== Stored Records ===\n");
    println!("  Runs: {}", counts.runs);
    println!("  Products: {}", counts.products);
    println!("  Reviews: {}", counts.reviews);

    if let Some((run_id, status)) = &counts.latest_run {
        println!();
        println!("Latest run {} ({}):", run_id, status);
        println!("  Products: {}", counts.latest_products);
        println!("  Reviews: {}", counts.latest_reviews);
    }
}
