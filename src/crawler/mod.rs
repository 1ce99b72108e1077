//! Crawler module for fetching, extracting and paginating
//!
//! This module contains the core crawling logic, including:
//! - Static and JS-rendered fetching behind the rendering gateway
//! - Link extraction and the deduplicating crawl frontier
//! - Product extraction and review pagination
//! - Overall crawl coordination

mod coordinator;
mod frontier;
mod gateway;
mod links;
mod product;
mod request;
mod reviews;
mod splash;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::Coordinator;
pub use frontier::{Admission, Frontier};
pub use gateway::{close_context, RenderedPage, RenderingGateway};
pub use links::extract_links;
pub use product::{
    discounted_price, pair_attributes, parse_count, parse_price, Extraction, ProductExtractor,
    ProductIdCounter,
};
pub use request::{FetchRequest, Link, RenderMode, WaitCondition};
pub use reviews::{
    label_value, parse_timestamp, review_page_url, AdvanceStrategy, ControlState, PagerControl,
    PaginationOutcome, ReviewPaginator, Termination,
};
pub use splash::{SplashContext, SplashRenderer};
pub use transport::{build_http_client, HttpTransport, RenderBackend, RenderContext, Transport};

use crate::config::Config;
use crate::output::CrawlReport;
use crate::CrawlerError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the SQLite sink and record a new run
/// 2. Build the HTTP transport and the Splash renderer
/// 3. Seed the frontier with the category roots
/// 4. Fetch listings, extract products and paginate their reviews
/// 5. Finish the run and return its report
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `config_hash` - Hash of the configuration file, stored on the run row
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed; drops and shortfalls are in the report
/// * `Err(CrawlerError)` - A root was unreachable or set-up failed
pub async fn crawl(config: Config, config_hash: &str) -> Result<CrawlReport, CrawlerError> {
    Coordinator::from_config(config, config_hash)?.run().await
}
