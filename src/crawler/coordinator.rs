//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the components together:
//! - Seeding the frontier with the category roots
//! - Dispatching fetch requests under a bounded concurrency budget
//! - Following listing links and extracting products
//! - Running the review paginator for every product with reviews
//! - Re-queueing transient failures and tallying every drop
//!
//! Only a root that exhausts its retries aborts the run. Everything else is
//! logged, counted in the report, and the crawl moves on.

use crate::config::Config;
use crate::crawler::frontier::{Admission, Frontier};
use crate::crawler::gateway::{RenderedPage, RenderingGateway};
use crate::crawler::links::extract_links;
use crate::crawler::product::{ProductExtractor, ProductIdCounter};
use crate::crawler::request::FetchRequest;
use crate::crawler::reviews::ReviewPaginator;
use crate::output::{CrawlReport, DropKind};
use crate::storage::{RecordSink, RunStatus, SqliteSink};
use crate::{CrawlerError, FetchError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    frontier: Arc<Frontier>,
    worker: Worker,
    report: Arc<Mutex<CrawlReport>>,
}

/// Everything a fetch task needs, cheap to clone into each task
#[derive(Clone)]
struct Worker {
    frontier: Arc<Frontier>,
    gateway: Arc<RenderingGateway>,
    extractor: Arc<ProductExtractor>,
    paginator: Arc<ReviewPaginator>,
    sink: Arc<dyn RecordSink>,
    report: Arc<Mutex<CrawlReport>>,
    retry_codes: Arc<[u16]>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `gateway` - The rendering gateway every fetch goes through
    /// * `sink` - Destination for product and review records
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlerError)` - A rule or selector failed to compile
    pub fn new(
        config: Config,
        gateway: Arc<RenderingGateway>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, CrawlerError> {
        let frontier = Arc::new(Frontier::from_config(&config)?);
        let extractor = Arc::new(ProductExtractor::new(
            &config.selectors.product,
            Arc::new(ProductIdCounter::new()),
        )?);
        let paginator = Arc::new(ReviewPaginator::from_config(Arc::clone(&gateway), &config)?);
        let report = Arc::new(Mutex::new(CrawlReport::new()));

        let worker = Worker {
            frontier: Arc::clone(&frontier),
            gateway,
            extractor,
            paginator,
            sink,
            report: Arc::clone(&report),
            retry_codes: config.crawler.retry_http_codes.clone().into(),
            max_retries: config.crawler.max_fetch_retries,
            retry_delay: Duration::from_millis(config.crawler.retry_delay_ms),
        };

        Ok(Self {
            config: Arc::new(config),
            frontier,
            worker,
            report,
        })
    }

    /// Creates a coordinator backed by reqwest, Splash and the SQLite sink
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `config_hash` - Hash recorded on the run row
    pub fn from_config(config: Config, config_hash: &str) -> Result<Self, CrawlerError> {
        let gateway = Arc::new(RenderingGateway::from_config(&config)?);
        let sink = SqliteSink::open(Path::new(&config.output.database_path), config_hash)?;
        tracing::info!(
            "Recording into {} as run {}",
            config.output.database_path,
            sink.run_id()
        );
        Self::new(config, gateway, Arc::new(sink))
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Runs the crawl to completion
    ///
    /// The sink is finished on every exit path, marked `completed` or
    /// `failed` accordingly.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The frontier drained; drops are in the report
    /// * `Err(CrawlerError)` - A root was unreachable or a task panicked
    pub async fn run(self) -> Result<CrawlReport, CrawlerError> {
        let start_time = std::time::Instant::now();
        tracing::info!(
            "Starting crawl of {} roots with {} concurrent fetches",
            self.config.site.roots.len(),
            self.config.crawler.max_concurrent_fetches
        );

        let result = match self.seed() {
            Ok(()) => self.crawl_loop().await,
            Err(e) => Err(e),
        };

        let status = if result.is_ok() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        if let Err(e) = self.worker.sink.finish(status) {
            tracing::error!("Failed to finish record sink: {}", e);
        }

        let report = {
            let mut report = self.report.lock().unwrap();
            report.finish(status);
            report.clone()
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    "Crawl completed in {:?}: {} products, {} reviews, {} data drops, {} missing reviews",
                    start_time.elapsed(),
                    report.products_emitted,
                    report.reviews_emitted,
                    report.data_drops(),
                    report.total_shortfall()
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Crawl aborted after {:?}: {}", start_time.elapsed(), e);
                Err(e)
            }
        }
    }

    fn seed(&self) -> Result<(), CrawlerError> {
        let mut seeded = 0;
        for root in &self.config.site.roots {
            let url = Url::parse(root)?;
            if self.frontier.seed(&url)? {
                seeded += 1;
            }
        }
        self.report.lock().unwrap().roots = seeded;
        tracing::info!("Seeded frontier with {} roots", seeded);
        Ok(())
    }

    /// Dispatches requests until the frontier is empty and nothing is in flight
    async fn crawl_loop(&self) -> Result<(), CrawlerError> {
        let permits = self.config.crawler.max_concurrent_fetches.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks: JoinSet<Result<(), CrawlerError>> = JoinSet::new();
        let mut dispatched = 0u64;

        loop {
            if let Some(request) = self.frontier.dequeue() {
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| CrawlerError::Task(e.to_string()))?;

                let worker = self.worker.clone();
                tasks.spawn(async move { worker.process(request, permit).await });

                dispatched += 1;
                if dispatched % 50 == 0 {
                    tracing::info!(
                        "Progress: {} fetches dispatched, {} queued, {} in flight",
                        dispatched,
                        self.frontier.len(),
                        tasks.len()
                    );
                }
                continue;
            }

            // Nothing queued: wait for an in-flight task, which may queue more
            match tasks.join_next().await {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    tasks.abort_all();
                    return Err(CrawlerError::Task(e.to_string()));
                }
                None => {
                    tracing::info!("Frontier is empty, crawl complete");
                    return Ok(());
                }
            }
        }
    }
}

impl Worker {
    /// Fetches one request and handles the page or the failure
    async fn process(
        &self,
        request: FetchRequest,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), CrawlerError> {
        tracing::debug!("Fetching {} ({})", request.url, request.kind);

        match self.gateway.fetch(&request).await {
            Ok(page) => {
                self.handle_page(&request, page).await;
                drop(permit);
                Ok(())
            }
            Err(error) => self.handle_failure(request, error, permit).await,
        }
    }

    async fn handle_page(&self, request: &FetchRequest, page: RenderedPage) {
        if request.kind.follows_links() {
            self.handle_listing(request, &page);
        } else {
            self.handle_product(request, page).await;
        }
    }

    /// Offers every link on a listing page to the frontier
    fn handle_listing(&self, request: &FetchRequest, page: &RenderedPage) {
        let links = extract_links(page);
        let (mut admitted, mut duplicate, mut unmatched, mut offsite) = (0u64, 0u64, 0u64, 0u64);

        for link in &links {
            match self.frontier.admit(link) {
                Admission::Admitted => admitted += 1,
                Admission::Duplicate => duplicate += 1,
                Admission::Unmatched | Admission::Invalid => unmatched += 1,
                Admission::Offsite => offsite += 1,
            }
        }

        {
            let mut report = self.report.lock().unwrap();
            report.listing_pages += 1;
            report.record_drops(DropKind::DuplicateLink, duplicate);
            report.record_drops(DropKind::UnmatchedLink, unmatched);
            report.record_drops(DropKind::OffsiteLink, offsite);
        }

        tracing::debug!(
            "Listing {}: {} links, {} admitted, {} duplicate, {} unmatched, {} offsite",
            request.url,
            links.len(),
            admitted,
            duplicate,
            unmatched,
            offsite
        );
    }

    /// Extracts the product, emits it and paginates its reviews
    async fn handle_product(&self, request: &FetchRequest, page: RenderedPage) {
        let extraction = self.extractor.extract(&page);
        let product = extraction.record;

        if !extraction.missing.is_empty() {
            tracing::warn!(
                "Product {} at {}: no value for {}",
                product.product_id,
                request.url,
                extraction.missing.join(", ")
            );
        }

        let accepted = self.sink.accept(product.clone().into());
        {
            let mut report = self.report.lock().unwrap();
            report.product_pages += 1;
            report.record_drops(
                DropKind::ExtractionFieldMissing,
                extraction.missing.len() as u64,
            );
            match &accepted {
                Ok(()) => report.products_emitted += 1,
                Err(_) => report.record_drop(DropKind::SinkRejected),
            }
        }
        if let Err(e) = accepted {
            tracing::warn!("Sink rejected product {}: {}", product.product_id, e);
        }

        if product.total_review_count == 0 {
            tracing::debug!("Product {} has no reviews", product.product_id);
            return;
        }

        let site_id = request
            .rule_id
            .and_then(|id| self.frontier.rules().get(id))
            .and_then(|rule| rule.site_id(&request.url));

        let outcome = self
            .paginator
            .run(&product, site_id.as_deref(), Some(&page), self.sink.as_ref())
            .await;

        self.report.lock().unwrap().record_pagination(&outcome);
    }

    /// Re-queues a transient failure or abandons the request
    ///
    /// The permit is released before the retry delay so a sleeping retry does
    /// not hold a fetch slot.
    async fn handle_failure(
        &self,
        request: FetchRequest,
        error: FetchError,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), CrawlerError> {
        drop(permit);

        if error.is_transient(&self.retry_codes) && request.retry_count < self.max_retries {
            tracing::warn!(
                "Fetch of {} failed ({}), retry {}/{}",
                request.url,
                error,
                request.retry_count + 1,
                self.max_retries
            );
            self.report.lock().unwrap().retries += 1;
            tokio::time::sleep(self.retry_delay).await;
            self.frontier.requeue(request);
            return Ok(());
        }

        let attempts = request.retry_count + 1;
        if request.is_root {
            return Err(CrawlerError::RootUnreachable {
                url: request.url.to_string(),
                attempts,
                source: error,
            });
        }

        let kind = if error.is_render_timeout() {
            DropKind::RenderTimeout
        } else {
            DropKind::FetchTransportError
        };
        self.report.lock().unwrap().record_drop(kind);
        tracing::warn!(
            "Abandoning {} after {} attempts: {}",
            request.url,
            attempts,
            error
        );
        Ok(())
    }
}
