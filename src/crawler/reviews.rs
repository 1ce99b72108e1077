//! The review paginator
//!
//! Walks the review pages nested in one product page and streams every review
//! to the sink as soon as it is parsed. Two page-advance strategies share the
//! same state machine:
//! - `DirectUrl` builds page N's URL from a template
//! - `DriveControl` clicks the "next page" control inside a render context
//!
//! The loop stops when the expected reviews are all seen, when the next-page
//! control is gone or terminal, when a page comes back empty, when the page
//! bound is hit, or when rendering keeps failing.

use crate::config::{
    compile_selector, Config, PagerConfig, ReviewConfig, ReviewSelectorConfig, StrategyKind,
};
use crate::crawler::gateway::{close_context, RenderedPage, RenderingGateway};
use crate::crawler::product::element_text;
use crate::crawler::request::WaitCondition;
use crate::crawler::transport::RenderContext;
use crate::state::{PaginationCursor, PaginationState};
use crate::storage::{ProductRecord, RecordSink, ReviewRecord};
use crate::{ConfigError, FetchError};
use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Most stars a review can show
const MAX_RATING: usize = 5;

/// The "next page" control of a review pager
#[derive(Debug, Clone)]
pub struct PagerControl {
    selector: String,
    index_offset: u32,
    terminal_label: Option<String>,
}

/// What the pager shows for the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlState {
    /// A live control; carries the selector to click
    Active(String),
    /// The control exists but reads as the terminal marker
    Terminal,
    /// No control at all
    Absent,
}

impl PagerControl {
    pub fn new(selector: impl Into<String>, index_offset: u32, terminal_label: Option<String>) -> Self {
        Self {
            selector: selector.into(),
            index_offset,
            terminal_label,
        }
    }

    pub fn from_config(config: &PagerConfig) -> Self {
        Self::new(
            config.control.clone(),
            config.index_offset,
            config.terminal_label.clone(),
        )
    }

    /// Selector of the control leading to `next_page`
    ///
    /// `{page}` is replaced by the page number and `{index}` by the page
    /// number plus the configured offset.
    pub fn selector_for(&self, next_page: u32) -> String {
        self.selector
            .replace("{page}", &next_page.to_string())
            .replace("{index}", &(next_page + self.index_offset).to_string())
    }

    /// Inspects a page's pager for the control leading to `next_page`
    pub fn state(&self, document: &Html, next_page: u32) -> ControlState {
        let selector_text = self.selector_for(next_page);
        let Ok(selector) = Selector::parse(&selector_text) else {
            return ControlState::Absent;
        };

        match document.select(&selector).next() {
            None => ControlState::Absent,
            Some(element) => {
                let label = element_text(element);
                match &self.terminal_label {
                    Some(terminal) if label == terminal.trim() => ControlState::Terminal,
                    _ => ControlState::Active(selector_text),
                }
            }
        }
    }
}

/// How the paginator reaches the next review page
#[derive(Debug, Clone)]
pub enum AdvanceStrategy {
    /// Fetch `template` with `{product_id}` and `{page}` filled in
    DirectUrl {
        template: String,
        wait: Option<WaitCondition>,
        pager: Option<PagerControl>,
    },
    /// Click the pager control inside a render context
    DriveControl {
        pager: PagerControl,
        wait: WaitCondition,
    },
}

impl AdvanceStrategy {
    /// Builds the strategy from the `[reviews]` table
    pub fn from_config(reviews: &ReviewConfig, entry_selector: &str) -> Result<Self, ConfigError> {
        let pager = reviews.pager.as_ref().map(PagerControl::from_config);

        match reviews.strategy {
            StrategyKind::DirectUrl => {
                let template = reviews.url_template.clone().ok_or_else(|| {
                    ConfigError::Validation("direct-url strategy needs a url-template".to_string())
                })?;
                let wait = reviews
                    .wait_selector
                    .as_deref()
                    .map(WaitCondition::new)
                    .transpose()?;
                Ok(Self::DirectUrl {
                    template,
                    wait,
                    pager,
                })
            }
            StrategyKind::DriveControl => {
                let pager = pager.ok_or_else(|| {
                    ConfigError::Validation("drive-control strategy needs [reviews.pager]".to_string())
                })?;
                let wait_selector = reviews.wait_selector.as_deref().unwrap_or(entry_selector);
                Ok(Self::DriveControl {
                    pager,
                    wait: WaitCondition::new(wait_selector)?,
                })
            }
        }
    }

    fn pager(&self) -> Option<&PagerControl> {
        match self {
            Self::DirectUrl { pager, .. } => pager.as_ref(),
            Self::DriveControl { pager, .. } => Some(pager),
        }
    }
}

/// Builds the URL of a review page from a direct-url template
pub fn review_page_url(template: &str, product_key: &str, page: u32) -> String {
    template
        .replace("{product_id}", product_key)
        .replace("{page}", &page.to_string())
}

/// Why a paginator stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every expected review was seen
    Exhausted,
    /// The next-page control was absent or terminal
    NoNextPage,
    /// A page yielded no review entries
    EmptyPage,
    /// The page bound was reached
    MaxPagesExceeded,
    /// Advancing failed on every attempt
    RenderFailed { attempts: u32, error: String },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::NoNextPage => write!(f, "no next page"),
            Self::EmptyPage => write!(f, "empty page"),
            Self::MaxPagesExceeded => write!(f, "max pages exceeded"),
            Self::RenderFailed { attempts, error } => {
                write!(f, "render failed after {} attempts: {}", attempts, error)
            }
        }
    }
}

/// Summary of one paginator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOutcome {
    pub product_id: u64,
    pub product_url: String,
    pub state: PaginationState,
    pub pages_visited: u32,
    pub reviews_seen: u32,
    pub total_review_count: u32,
    /// Pages the review count implies
    pub estimated_pages: u32,
    pub termination: Termination,
    /// Reviews the sink refused
    pub sink_rejections: u32,
}

impl PaginationOutcome {
    /// Expected reviews that were never seen
    pub fn shortfall(&self) -> u32 {
        self.total_review_count.saturating_sub(self.reviews_seen)
    }

    /// True when the loop stopped early because the pager and the count disagree
    pub fn is_desync(&self) -> bool {
        matches!(self.termination, Termination::NoNextPage | Termination::EmptyPage)
            && self.shortfall() > 0
    }
}

/// Compiled review selectors
#[derive(Debug, Clone)]
struct ReviewSelectors {
    entry: Selector,
    selected_star: Selector,
    timestamp: Selector,
    timestamp_format: String,
    text: Selector,
    size: Selector,
    color: Selector,
}

impl ReviewSelectors {
    fn from_config(config: &ReviewSelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            entry: compile_selector(&config.entry)?,
            selected_star: compile_selector(&config.selected_star)?,
            timestamp: compile_selector(&config.timestamp)?,
            timestamp_format: config.timestamp_format.clone(),
            text: compile_selector(&config.text)?,
            size: compile_selector(&config.size)?,
            color: compile_selector(&config.color)?,
        })
    }

    fn parse_entry(&self, entry: ElementRef<'_>, product_id: u64) -> ReviewRecord {
        let first = |selector: &Selector| {
            entry
                .select(selector)
                .next()
                .map(element_text)
                .unwrap_or_default()
        };

        let rating = entry.select(&self.selected_star).count().min(MAX_RATING) as u8;

        ReviewRecord {
            product_id,
            rating,
            submitted_at: parse_timestamp(&first(&self.timestamp), &self.timestamp_format),
            text: first(&self.text),
            size: label_value(&first(&self.size)).to_string(),
            color: label_value(&first(&self.color)).to_string(),
        }
    }
}

/// Parses a review date as UTC; anything unparseable becomes 0
pub fn parse_timestamp(text: &str, format: &str) -> i64 {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return dt.and_utc().timestamp();
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Keeps what follows the first ": " of a "Size: M" style label
pub fn label_value(text: &str) -> &str {
    text.split_once(": ")
        .map(|(_, value)| value)
        .unwrap_or(text)
        .trim()
}

/// What one review page yielded
#[derive(Debug, Default)]
struct PageReading {
    /// Entries present on the page
    found: usize,
    /// Entries sent to the sink
    taken: usize,
    rejections: u32,
    control: Option<ControlState>,
}

/// Drives review pagination for products
pub struct ReviewPaginator {
    gateway: Arc<RenderingGateway>,
    strategy: AdvanceStrategy,
    selectors: ReviewSelectors,
    reviews_per_page: u32,
    max_pages: u32,
    render_attempts: u32,
}

impl ReviewPaginator {
    /// Creates a paginator
    ///
    /// # Arguments
    ///
    /// * `gateway` - Gateway used for every page fetch and render context
    /// * `reviews` - The `[reviews]` table
    /// * `selectors` - The `[selectors.review]` table
    /// * `render_attempts` - Attempts per page advance, each with a fresh context
    pub fn new(
        gateway: Arc<RenderingGateway>,
        reviews: &ReviewConfig,
        selectors: &ReviewSelectorConfig,
        render_attempts: u32,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            gateway,
            strategy: AdvanceStrategy::from_config(reviews, &selectors.entry)?,
            selectors: ReviewSelectors::from_config(selectors)?,
            reviews_per_page: reviews.reviews_per_page,
            max_pages: reviews.max_pages,
            render_attempts: render_attempts.max(1),
        })
    }

    pub fn from_config(gateway: Arc<RenderingGateway>, config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            gateway,
            &config.reviews,
            &config.selectors.review,
            config.render.render_attempts,
        )
    }

    /// Walks a product's review pages, streaming reviews into `sink`
    ///
    /// # Arguments
    ///
    /// * `product` - The extracted product; its review count is not re-read
    /// * `site_id` - Site product id used for `{product_id}` in URL templates
    /// * `product_page` - The rendered product page, used as page 1 when
    ///   driving the pager control
    /// * `sink` - Destination for review records
    ///
    /// Any render context opened along the way is closed before returning.
    pub async fn run(
        &self,
        product: &ProductRecord,
        site_id: Option<&str>,
        product_page: Option<&RenderedPage>,
        sink: &dyn RecordSink,
    ) -> PaginationOutcome {
        let mut session: Option<Box<dyn RenderContext>> = None;
        let outcome = self
            .walk(product, site_id, product_page, sink, &mut session)
            .await;

        if let Some(ctx) = session.take() {
            close_context(ctx).await;
        }

        match &outcome.termination {
            Termination::Exhausted => tracing::debug!(
                "Product {}: all {} reviews collected over {} pages",
                outcome.product_id,
                outcome.reviews_seen,
                outcome.pages_visited
            ),
            Termination::RenderFailed { .. } => tracing::warn!(
                "Product {}: giving up on reviews at page {} ({}), shortfall {}",
                outcome.product_id,
                outcome.pages_visited + 1,
                outcome.termination,
                outcome.shortfall()
            ),
            termination if outcome.shortfall() > 0 => tracing::warn!(
                "Product {}: pagination stopped ({}) with {} of {} reviews, shortfall {}",
                outcome.product_id,
                termination,
                outcome.reviews_seen,
                outcome.total_review_count,
                outcome.shortfall()
            ),
            _ => {}
        }

        outcome
    }

    async fn walk(
        &self,
        product: &ProductRecord,
        site_id: Option<&str>,
        product_page: Option<&RenderedPage>,
        sink: &dyn RecordSink,
        session: &mut Option<Box<dyn RenderContext>>,
    ) -> PaginationOutcome {
        let mut cursor = PaginationCursor::new(
            product.product_id,
            product.product_url.clone(),
            product.total_review_count,
        );
        let mut state = PaginationState::Start;
        let mut pages_visited = 0;
        let mut sink_rejections = 0;
        let mut previous_html = String::new();

        let finish = |cursor: &PaginationCursor,
                      state: PaginationState,
                      pages_visited: u32,
                      sink_rejections: u32,
                      termination: Termination| PaginationOutcome {
            product_id: cursor.product_id,
            product_url: cursor.product_url.clone(),
            state,
            pages_visited,
            reviews_seen: cursor.reviews_seen,
            total_review_count: cursor.total_review_count,
            estimated_pages: cursor.estimated_pages(self.reviews_per_page),
            termination,
            sink_rejections,
        };

        let product_url = match Url::parse(&cursor.product_url) {
            Ok(url) => url,
            Err(e) => {
                transition(&mut state, PaginationState::Failed, &cursor);
                let termination = Termination::RenderFailed {
                    attempts: 0,
                    error: e.to_string(),
                };
                return finish(&cursor, state, 0, 0, termination);
            }
        };
        let product_key = site_id
            .map(str::to_string)
            .unwrap_or_else(|| cursor.product_id.to_string());

        transition(&mut state, PaginationState::FetchingPage, &cursor);

        loop {
            let fetched = match (&self.strategy, cursor.page_number, product_page) {
                (AdvanceStrategy::DriveControl { .. }, 1, Some(page)) => Ok(page.clone()),
                _ => {
                    self.fetch_page(&cursor, &product_url, &product_key, &previous_html, session)
                        .await
                }
            };

            let page = match fetched {
                Ok(page) => page,
                Err(error) => {
                    transition(&mut state, PaginationState::Failed, &cursor);
                    let termination = Termination::RenderFailed {
                        attempts: self.render_attempts,
                        error: error.to_string(),
                    };
                    return finish(&cursor, state, pages_visited, sink_rejections, termination);
                }
            };
            pages_visited += 1;

            transition(&mut state, PaginationState::ExtractingReviews, &cursor);
            let reading = self.emit_page(
                &page,
                cursor.page_number + 1,
                cursor.product_id,
                cursor.remaining() as usize,
                sink,
            );
            let found = reading.found;
            sink_rejections += reading.rejections;
            cursor.record(reading.taken as u32);
            previous_html = page.html().to_string();

            tracing::debug!(
                "Product {} review page {}: {} entries, {}/{} seen",
                cursor.product_id,
                cursor.page_number,
                found,
                cursor.reviews_seen,
                cursor.total_review_count
            );

            transition(&mut state, PaginationState::AdvancingPage, &cursor);

            let termination = if cursor.is_exhausted() {
                Some(Termination::Exhausted)
            } else if found == 0 {
                Some(Termination::EmptyPage)
            } else if matches!(
                reading.control,
                Some(ControlState::Absent) | Some(ControlState::Terminal)
            ) {
                Some(Termination::NoNextPage)
            } else if cursor.page_number >= self.max_pages {
                Some(Termination::MaxPagesExceeded)
            } else {
                None
            };

            if let Some(termination) = termination {
                transition(&mut state, PaginationState::Done, &cursor);
                return finish(&cursor, state, pages_visited, sink_rejections, termination);
            }

            cursor.advance();
            transition(&mut state, PaginationState::FetchingPage, &cursor);
        }
    }

    /// Streams one page's review entries to the sink and reads its pager
    ///
    /// Each entry is handed to the sink as soon as it is parsed. Entries past
    /// `limit` are counted but not emitted.
    fn emit_page(
        &self,
        page: &RenderedPage,
        next_page: u32,
        product_id: u64,
        limit: usize,
        sink: &dyn RecordSink,
    ) -> PageReading {
        let document = page.parse();
        let mut reading = PageReading::default();

        for entry in document.select(&self.selectors.entry) {
            reading.found += 1;
            if reading.taken >= limit {
                continue;
            }
            let review = self.selectors.parse_entry(entry, product_id);
            reading.taken += 1;
            if let Err(e) = sink.accept(review.into()) {
                reading.rejections += 1;
                tracing::warn!("Sink rejected review of product {}: {}", product_id, e);
            }
        }

        reading.control = self
            .strategy
            .pager()
            .map(|pager| pager.state(&document, next_page));

        reading
    }

    /// Obtains the cursor's current page, retrying up to the attempt bound
    async fn fetch_page(
        &self,
        cursor: &PaginationCursor,
        product_url: &Url,
        product_key: &str,
        previous_html: &str,
        session: &mut Option<Box<dyn RenderContext>>,
    ) -> Result<RenderedPage, FetchError> {
        let mut last_error = None;

        for attempt in 1..=self.render_attempts {
            let result = match &self.strategy {
                AdvanceStrategy::DirectUrl { template, wait, .. } => {
                    self.fetch_direct(template, wait.as_ref(), product_key, cursor.page_number)
                        .await
                }
                AdvanceStrategy::DriveControl { pager, wait } => {
                    self.drive_to(
                        pager,
                        wait,
                        product_url,
                        cursor.page_number,
                        previous_html,
                        session,
                    )
                    .await
                }
            };

            match result {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::debug!(
                        "Product {} review page {} attempt {}/{} failed: {}",
                        cursor.product_id,
                        cursor.page_number,
                        attempt,
                        self.render_attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Render {
            url: product_url.to_string(),
            message: "no render attempts made".to_string(),
        }))
    }

    async fn fetch_direct(
        &self,
        template: &str,
        wait: Option<&WaitCondition>,
        product_key: &str,
        page: u32,
    ) -> Result<RenderedPage, FetchError> {
        let raw = review_page_url(template, product_key, page);
        let url = Url::parse(&raw).map_err(|e| FetchError::Transport {
            url: raw.clone(),
            message: e.to_string(),
            timeout: false,
        })?;

        match wait {
            Some(wait) => self.gateway.fetch_rendered(&url, wait).await,
            None => self.gateway.fetch_static(&url).await,
        }
    }

    /// Reaches `target_page` by clicking the pager control
    ///
    /// A live session is advanced by one click. Without one (first advance, or
    /// after a failure) a fresh context is opened, the product page loaded and
    /// every click up to the target replayed. A failed session is closed.
    async fn drive_to(
        &self,
        pager: &PagerControl,
        wait: &WaitCondition,
        product_url: &Url,
        target_page: u32,
        previous_html: &str,
        session: &mut Option<Box<dyn RenderContext>>,
    ) -> Result<RenderedPage, FetchError> {
        if let Some(ctx) = session.as_mut() {
            let control = pager.selector_for(target_page);
            let result = self
                .gateway
                .click_and_wait(ctx.as_mut(), product_url, &control, wait, previous_html)
                .await;
            if result.is_ok() {
                return result;
            }
            if let Some(ctx) = session.take() {
                close_context(ctx).await;
            }
            return result;
        }

        let mut ctx = self.gateway.open_context().await?;
        match self.replay(ctx.as_mut(), pager, wait, product_url, target_page).await {
            Ok(page) => {
                *session = Some(ctx);
                Ok(page)
            }
            Err(e) => {
                close_context(ctx).await;
                Err(e)
            }
        }
    }

    async fn replay(
        &self,
        ctx: &mut dyn RenderContext,
        pager: &PagerControl,
        wait: &WaitCondition,
        product_url: &Url,
        target_page: u32,
    ) -> Result<RenderedPage, FetchError> {
        let mut page = self.gateway.load(ctx, product_url, wait).await?;
        for next in 2..=target_page {
            let control = pager.selector_for(next);
            let previous = page;
            page = self
                .gateway
                .click_and_wait(ctx, product_url, &control, wait, previous.html())
                .await?;
        }
        Ok(page)
    }
}

fn transition(state: &mut PaginationState, next: PaginationState, cursor: &PaginationCursor) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid pagination transition {} -> {}",
        state,
        next
    );
    tracing::trace!(
        product_id = cursor.product_id,
        page = cursor.page_number,
        "Pagination {} -> {}",
        state,
        next
    );
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::crawler::testing::{FakeRenderer, FakeTransport};
    use crate::storage::{MemorySink, Record, RunStatus, SinkError, SinkResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PRODUCT_URL: &str = "https://shop.example.com/zip-hoodie-product4471.html";

    fn reviews_html(entries: usize, page: u32, next_label: Option<&str>) -> String {
        let mut html = String::from("<html><body>");
        for i in 0..entries {
            html.push_str(&format!(
                r#"<div class="review">
                    <i class="star-on"></i><i class="star-on"></i><i class="star-on"></i><i class="star-off"></i>
                    <span class="time">Jan,05 2019 10:30:00</span>
                    <p class="body">Review {}-{}</p>
                    <span class="size">Size: M</span>
                    <span class="color">Color: Gray</span>
                </div>"#,
                page, i
            ));
        }
        if let Some(label) = next_label {
            html.push_str(&format!(r#"<a class="next">{}</a>"#, label));
        }
        html.push_str("</body></html>");
        html
    }

    fn product(total_review_count: u32) -> ProductRecord {
        ProductRecord {
            product_id: 9,
            name: "Zip Hoodie".to_string(),
            product_url: PRODUCT_URL.to_string(),
            original_price: 25.0,
            discounted_price: 0.0,
            discount_percent: 0,
            total_review_count,
            attributes: Vec::new(),
        }
    }

    fn gateway(transport: FakeTransport, renderer: Arc<FakeRenderer>) -> Arc<RenderingGateway> {
        Arc::new(RenderingGateway::new(
            Arc::new(transport),
            renderer,
            Duration::from_millis(1),
            Duration::from_millis(30),
        ))
    }

    fn direct_paginator(gateway: Arc<RenderingGateway>, max_pages: u32) -> ReviewPaginator {
        let mut config = test_config();
        config.reviews.max_pages = max_pages;
        ReviewPaginator::from_config(gateway, &config).unwrap()
    }

    fn drive_paginator(gateway: Arc<RenderingGateway>) -> ReviewPaginator {
        let mut config = test_config();
        config.reviews.strategy = StrategyKind::DriveControl;
        config.reviews.url_template = None;
        ReviewPaginator::from_config(gateway, &config).unwrap()
    }

    fn page_of(url: &Url) -> u32 {
        url.path().rsplit('/').next().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_stops_when_count_reached() {
        let transport = FakeTransport::new(|url| {
            assert!(url.path().starts_with("/reviews/4471/"));
            Ok(reviews_html(6, page_of(url), Some("next")))
        });
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        let outcome = paginator.run(&product(10), Some("4471"), None, &sink).await;

        assert_eq!(outcome.state, PaginationState::Done);
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.pages_visited, 2);
        assert_eq!(outcome.estimated_pages, 2);
        assert_eq!(outcome.shortfall(), 0);
        assert_eq!(sink.reviews().len(), 10);
        assert!(sink.reviews().iter().all(|r| r.product_id == 9));
    }

    #[tokio::test]
    async fn test_desync_reports_shortfall() {
        let transport = FakeTransport::new(|url| Ok(reviews_html(4, page_of(url), None)));
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        let outcome = paginator.run(&product(10), Some("4471"), None, &sink).await;

        assert_eq!(outcome.state, PaginationState::Done);
        assert_eq!(outcome.termination, Termination::NoNextPage);
        assert_eq!(outcome.pages_visited, 1);
        assert_eq!(outcome.shortfall(), 6);
        assert!(outcome.is_desync());
        assert_eq!(sink.reviews().len(), 4);
    }

    /// Records review texts in arrival order and rejects one of them
    struct OrderedSink {
        texts: std::sync::Mutex<Vec<String>>,
        reject: &'static str,
    }

    impl RecordSink for OrderedSink {
        fn accept(&self, record: Record) -> SinkResult<()> {
            let Record::Review(review) = record else {
                return Ok(());
            };
            if review.text == self.reject {
                return Err(SinkError::Database("constraint failed".to_string()));
            }
            self.texts.lock().unwrap().push(review.text);
            Ok(())
        }

        fn finish(&self, _status: RunStatus) -> SinkResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_entries_stream_to_sink_one_by_one() {
        let transport = FakeTransport::new(|url| Ok(reviews_html(6, page_of(url), Some("next"))));
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = OrderedSink {
            texts: std::sync::Mutex::new(Vec::new()),
            reject: "Review 1-2",
        };

        let outcome = paginator.run(&product(8), Some("4471"), None, &sink).await;

        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.reviews_seen, 8);
        assert_eq!(outcome.sink_rejections, 1);
        assert_eq!(
            *sink.texts.lock().unwrap(),
            vec![
                "Review 1-0",
                "Review 1-1",
                "Review 1-3",
                "Review 1-4",
                "Review 1-5",
                "Review 2-0",
                "Review 2-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_terminal_label_stops() {
        let transport = FakeTransport::new(|url| Ok(reviews_html(6, page_of(url), Some(">"))));
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        let outcome = paginator.run(&product(30), Some("4471"), None, &sink).await;

        assert_eq!(outcome.termination, Termination::NoNextPage);
        assert_eq!(outcome.shortfall(), 24);
    }

    #[tokio::test]
    async fn test_empty_page_stops() {
        let transport = FakeTransport::new(|url| {
            let page = page_of(url);
            let entries = if page == 1 { 6 } else { 0 };
            Ok(reviews_html(entries, page, Some("next")))
        });
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        let outcome = paginator.run(&product(12), Some("4471"), None, &sink).await;

        assert_eq!(outcome.termination, Termination::EmptyPage);
        assert_eq!(outcome.pages_visited, 2);
        assert_eq!(outcome.shortfall(), 6);
    }

    #[tokio::test]
    async fn test_max_pages_bound() {
        let transport = FakeTransport::new(|url| Ok(reviews_html(6, page_of(url), Some("next"))));
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 2);
        let sink = MemorySink::new();

        let outcome = paginator.run(&product(100), Some("4471"), None, &sink).await;

        assert_eq!(outcome.state, PaginationState::Done);
        assert_eq!(outcome.termination, Termination::MaxPagesExceeded);
        assert_eq!(outcome.pages_visited, 2);
        assert_eq!(sink.reviews().len(), 12);
    }

    #[tokio::test]
    async fn test_unparseable_timestamp_is_zero() {
        let transport = FakeTransport::new(|_| {
            let html = reviews_html(3, 1, None).replacen(
                "<span class=\"time\">Jan,05 2019 10:30:00</span>",
                "<span class=\"time\">yesterday</span>",
                2,
            );
            // Restore the first entry so only the second one is broken
            Ok(html.replacen(
                "<span class=\"time\">yesterday</span>",
                "<span class=\"time\">Jan,05 2019 10:30:00</span>",
                1,
            ))
        });
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        paginator.run(&product(3), Some("4471"), None, &sink).await;

        let stamps: Vec<i64> = sink.reviews().iter().map(|r| r.submitted_at).collect();
        assert_eq!(stamps, vec![1_546_684_200, 0, 1_546_684_200]);
    }

    #[tokio::test]
    async fn test_review_fields_parsed() {
        let transport = FakeTransport::new(|_| Ok(reviews_html(1, 1, None)));
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        paginator.run(&product(1), Some("4471"), None, &sink).await;

        let review = &sink.reviews()[0];
        assert_eq!(review.rating, 3);
        assert_eq!(review.text, "Review 1-0");
        assert_eq!(review.size, "M");
        assert_eq!(review.color, "Gray");
    }

    #[tokio::test]
    async fn test_direct_url_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let transport = FakeTransport::new(move |url| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok(reviews_html(2, 1, None))
        });
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| unreachable!()));
        let paginator = direct_paginator(gateway(transport, renderer), 20);
        let sink = MemorySink::new();

        let outcome = paginator.run(&product(2), Some("4471"), None, &sink).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(sink.reviews().len(), 2);
    }

    #[tokio::test]
    async fn test_drive_control_clicks_through_pages() {
        let renderer = Arc::new(FakeRenderer::new(|url, clicks, _| {
            assert_eq!(url.as_str(), PRODUCT_URL);
            let page = clicks.len() as u32 + 1;
            Ok(reviews_html(6, page, Some("next")))
        }));
        let gw = gateway(FakeTransport::unused(), Arc::clone(&renderer));
        let paginator = drive_paginator(gw);
        let sink = MemorySink::new();

        let first = RenderedPage::new(Url::parse(PRODUCT_URL).unwrap(), reviews_html(6, 1, Some("next")));
        let outcome = paginator.run(&product(14), Some("4471"), Some(&first), &sink).await;

        assert_eq!(outcome.termination, Termination::Exhausted);
        assert_eq!(outcome.pages_visited, 3);
        assert_eq!(sink.reviews().len(), 14);
        assert_eq!(sink.reviews()[13].text, "Review 3-1");
        // One session, reused for every click, closed at the end
        assert_eq!(renderer.opened(), 1);
        assert_eq!(renderer.closed(), 1);
    }

    #[tokio::test]
    async fn test_render_timeout_gives_up_after_bound() {
        // Every render context shows a page that never satisfies the wait
        let renderer = Arc::new(FakeRenderer::new(|_, _, _| {
            Ok("<html><body>loading</body></html>".to_string())
        }));
        let gw = gateway(FakeTransport::unused(), Arc::clone(&renderer));
        let paginator = drive_paginator(gw);
        let sink = MemorySink::new();

        let first = RenderedPage::new(Url::parse(PRODUCT_URL).unwrap(), reviews_html(6, 1, Some("next")));
        let outcome = paginator.run(&product(20), Some("4471"), Some(&first), &sink).await;

        assert_eq!(outcome.state, PaginationState::Failed);
        assert!(matches!(
            outcome.termination,
            Termination::RenderFailed { attempts: 4, .. }
        ));
        assert_eq!(renderer.opened(), 4);
        assert_eq!(renderer.closed(), 4);
        assert_eq!(outcome.reviews_seen, 6);
        assert_eq!(sink.reviews().len(), 6);
        assert_eq!(outcome.shortfall(), 14);
    }

    #[test]
    fn test_pager_selector_placeholders() {
        let pager = PagerControl::new("#pager li:nth-child({index}) a[data-page='{page}']", 1, None);
        assert_eq!(pager.selector_for(2), "#pager li:nth-child(3) a[data-page='2']");
    }

    #[test]
    fn test_pager_states() {
        let pager = PagerControl::new("a.next", 0, Some(">".to_string()));
        let active = Html::parse_document(r#"<a class="next">2</a>"#);
        let terminal = Html::parse_document(r#"<a class="next"> &gt; </a>"#);
        let absent = Html::parse_document("<p>no pager</p>");

        assert_eq!(pager.state(&active, 2), ControlState::Active("a.next".to_string()));
        assert_eq!(pager.state(&terminal, 2), ControlState::Terminal);
        assert_eq!(pager.state(&absent, 2), ControlState::Absent);
    }

    #[test]
    fn test_label_value() {
        assert_eq!(label_value("Size: XL"), "XL");
        assert_eq!(label_value("Color: Navy: Blue"), "Navy: Blue");
        assert_eq!(label_value(" One Size "), "One Size");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("Jan,01 2019 00:00:00", "%b,%d %Y %H:%M:%S"), 1_546_300_800);
        assert_eq!(parse_timestamp("2019-01-01", "%Y-%m-%d"), 1_546_300_800);
        assert_eq!(parse_timestamp("", "%b,%d %Y %H:%M:%S"), 0);
    }

    #[test]
    fn test_review_page_url() {
        assert_eq!(
            review_page_url("https://shop.example.com/reviews/{product_id}/{page}", "4471", 3),
            "https://shop.example.com/reviews/4471/3"
        );
    }
}
