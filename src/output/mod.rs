//! Output module for run reports and summaries
//!
//! This module handles:
//! - Counting drops and review shortfalls over a run
//! - Printing run reports and stored record counts
//! - Generating markdown summaries of crawl results

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use report::{CrawlReport, DropKind, Shortfall};
pub use stats::{print_report, print_stored_counts};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
