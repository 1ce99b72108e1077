use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use storefront_crawler::config::load_config;
///
/// let config = load_config(Path::new("crawl.toml")).unwrap();
/// println!("Concurrency: {}", config.crawler.max_concurrent_fetches);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored with each crawl run so the records in the database can
/// be traced back to the configuration that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
pub(crate) const TEST_CONFIG: &str = r##"
[crawler]
max-concurrent-fetches = 4
traversal-order = "fifo"
max-fetch-retries = 2
retry-delay-ms = 10

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[render]
splash-url = "http://localhost:8050"
poll-interval-ms = 10
wait-timeout-ms = 200
settle-ms = 0
render-attempts = 4

[site]
roots = ["https://shop.example.com/hoodies-c-181-page-1.html"]
allowed-domains = ["*.example.com"]

[[rule]]
id = "listing"
kind = "listing"
pattern = 'page-[0-9]+\.html'

[[rule]]
id = "product"
kind = "product"
pattern = 'product(?P<id>[0-9]+)\.html'
render = "rendered"
wait-selector = "span.price"

[selectors.product]
name = "h1.name"
original-price = "span.price"
discount = "span.discount"
attribute-labels = "dl.info dt"
attribute-values = "dl.info dd"
review-count = "#review-count"

[selectors.review]
entry = "div.review"
selected-star = "i.star-on"
timestamp = "span.time"
timestamp-format = "%b,%d %Y %H:%M:%S"
text = "p.body"
size = "span.size"
color = "span.color"

[reviews]
reviews-per-page = 6
max-pages = 20
strategy = "direct-url"
url-template = "https://shop.example.com/reviews/{product_id}/{page}"

[reviews.pager]
control = "a.next"
terminal-label = ">"

[output]
database-path = "./test.db"
summary-path = "./summary.md"
"##;

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    parse_config(TEST_CONFIG).unwrap()
}
