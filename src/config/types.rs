use serde::Deserialize;

/// Main configuration structure for a storefront crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub render: RenderConfig,
    pub site: SiteConfig,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleEntry>,
    pub selectors: SelectorConfig,
    pub reviews: ReviewConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of fetches in flight at once
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: u32,

    /// Order in which the frontier hands out requests
    #[serde(rename = "traversal-order", default)]
    pub traversal_order: TraversalOrder,

    /// Retry ceiling for a single frontier request
    #[serde(rename = "max-fetch-retries", default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,

    /// Delay before a failed request is re-queued (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// HTTP statuses worth retrying
    #[serde(rename = "retry-http-codes", default = "default_retry_http_codes")]
    pub retry_http_codes: Vec<u16>,
}

/// Frontier traversal order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalOrder {
    /// Breadth-first: category pages before the products they list
    #[default]
    Fifo,
    /// Depth-first: most recently discovered links first
    Lifo,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Rendering backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Base URL of the Splash rendering service
    #[serde(rename = "splash-url")]
    pub splash_url: String,

    /// Interval between wait-condition checks (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single render wait (milliseconds)
    #[serde(rename = "wait-timeout-ms", default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Time the renderer lets scripts run after navigating or clicking (milliseconds)
    #[serde(rename = "settle-ms", default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Attempts per review page advance, each in a fresh render context
    #[serde(rename = "render-attempts", default = "default_render_attempts")]
    pub render_attempts: u32,

    /// HTTP timeout for a single call to the renderer (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Site being crawled
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Category root URLs the frontier is seeded with
    pub roots: Vec<String>,

    /// Domain patterns links must match (e.g., "*.example.com")
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,
}

/// Page kinds a link rule can dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Listing,
    Product,
}

/// How pages matched by a rule are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Static,
    Rendered,
}

/// A single link rule entry
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    /// Rule name used in logs
    pub id: String,

    /// Handler the rule dispatches matched links to
    pub kind: RuleKind,

    /// Regular expression matched against the URL path (and query)
    pub pattern: String,

    /// Fetch strategy for matched pages
    #[serde(default = "default_render_kind")]
    pub render: RenderKind,

    /// Selector that must be present before a rendered page is returned
    #[serde(rename = "wait-selector", default)]
    pub wait_selector: Option<String>,

    /// Treat URLs differing only by query string as duplicates
    #[serde(rename = "ignore-query", default = "default_true")]
    pub ignore_query: bool,
}

/// CSS selectors for the product and review extractors
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    pub product: ProductSelectorConfig,
    pub review: ReviewSelectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductSelectorConfig {
    pub name: String,
    #[serde(rename = "original-price")]
    pub original_price: String,
    pub discount: String,
    #[serde(rename = "attribute-labels")]
    pub attribute_labels: String,
    #[serde(rename = "attribute-values")]
    pub attribute_values: String,
    #[serde(rename = "review-count")]
    pub review_count: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSelectorConfig {
    /// One node per review on a review page
    pub entry: String,
    /// Filled star markers inside an entry
    #[serde(rename = "selected-star")]
    pub selected_star: String,
    pub timestamp: String,
    /// chrono format string for the timestamp text
    #[serde(rename = "timestamp-format")]
    pub timestamp_format: String,
    pub text: String,
    pub size: String,
    pub color: String,
}

/// Review pagination strategy names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Build each review page URL from a template
    DirectUrl,
    /// Click the pager control inside a render context
    DriveControl,
}

/// Review pagination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    #[serde(rename = "reviews-per-page")]
    pub reviews_per_page: u32,

    /// Safety bound on pages visited per product
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    pub strategy: StrategyKind,

    /// Review page URL with `{product_id}` and `{page}` placeholders
    #[serde(rename = "url-template", default)]
    pub url_template: Option<String>,

    /// Selector awaited on review pages; absent means direct URLs are fetched statically
    #[serde(rename = "wait-selector", default)]
    pub wait_selector: Option<String>,

    #[serde(default)]
    pub pager: Option<PagerConfig>,
}

/// The "next page" control of the review pager
#[derive(Debug, Clone, Deserialize)]
pub struct PagerConfig {
    /// Selector for the control; may contain `{page}` and `{index}`
    pub control: String,

    /// Added to the next page number to produce `{index}`
    #[serde(rename = "index-offset", default)]
    pub index_offset: u32,

    /// Visible label marking the control as the end of the pager
    #[serde(rename = "terminal-label", default)]
    pub terminal_label: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

fn default_max_fetch_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_retry_http_codes() -> Vec<u16> {
    vec![500, 502, 503, 504, 400, 403, 404, 408, 429]
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_wait_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    1000
}

fn default_render_attempts() -> u32 {
    4
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_render_kind() -> RenderKind {
    RenderKind::Static
}

fn default_true() -> bool {
    true
}
