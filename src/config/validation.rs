use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, RenderConfig, RenderKind, ReviewConfig, RuleEntry,
    RuleKind, SelectorConfig, SiteConfig, StrategyKind, UserAgentConfig,
};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_render_config(&config.render)?;
    validate_site_config(&config.site)?;
    validate_rules(&config.rules)?;
    validate_selectors(&config.selectors)?;
    validate_review_config(&config.reviews, &config.rules)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if let Some(code) = config
        .retry_http_codes
        .iter()
        .find(|code| !(100..=599).contains(*code))
    {
        return Err(ConfigError::Validation(format!(
            "retry_http_codes contains invalid status {}",
            code
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates rendering configuration
fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    validate_http_url("splash_url", &config.splash_url)?;

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.wait_timeout_ms <= config.poll_interval_ms {
        return Err(ConfigError::Validation(format!(
            "wait_timeout_ms ({}ms) must exceed poll_interval_ms ({}ms)",
            config.wait_timeout_ms, config.poll_interval_ms
        )));
    }

    if config.render_attempts < 1 {
        return Err(ConfigError::Validation(
            "render_attempts must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the crawl roots and allowed domains
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.roots.is_empty() {
        return Err(ConfigError::Validation(
            "site must have at least one root URL".to_string(),
        ));
    }

    for root in &config.roots {
        validate_http_url("root", root)?;
    }

    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

/// Validates the link rules
fn validate_rules(rules: &[RuleEntry]) -> Result<(), ConfigError> {
    if rules.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[rule]] is required".to_string(),
        ));
    }

    for rule in rules {
        if rule.id.is_empty() {
            return Err(ConfigError::Validation("rule id cannot be empty".to_string()));
        }

        Regex::new(&rule.pattern).map_err(|e| ConfigError::InvalidRule {
            rule: rule.id.clone(),
            message: e.to_string(),
        })?;

        match (rule.render, &rule.wait_selector) {
            (RenderKind::Rendered, None) => {
                return Err(ConfigError::InvalidRule {
                    rule: rule.id.clone(),
                    message: "rendered rules need a wait-selector".to_string(),
                });
            }
            (_, Some(selector)) => validate_selector(selector)?,
            _ => {}
        }
    }

    Ok(())
}

/// Validates every extractor selector
fn validate_selectors(config: &SelectorConfig) -> Result<(), ConfigError> {
    let product = &config.product;
    for selector in [
        &product.name,
        &product.original_price,
        &product.discount,
        &product.attribute_labels,
        &product.attribute_values,
        &product.review_count,
    ] {
        validate_selector(selector)?;
    }

    let review = &config.review;
    for selector in [
        &review.entry,
        &review.selected_star,
        &review.timestamp,
        &review.text,
        &review.size,
        &review.color,
    ] {
        validate_selector(selector)?;
    }

    if review.timestamp_format.trim().is_empty() {
        return Err(ConfigError::Validation(
            "timestamp_format cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates review pagination against the chosen strategy
fn validate_review_config(config: &ReviewConfig, rules: &[RuleEntry]) -> Result<(), ConfigError> {
    if config.reviews_per_page < 1 {
        return Err(ConfigError::Validation(
            "reviews_per_page must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation("max_pages must be >= 1".to_string()));
    }

    if let Some(selector) = &config.wait_selector {
        validate_selector(selector)?;
    }

    if let Some(pager) = &config.pager {
        // Placeholders are substituted with digits before parsing
        validate_selector(&pager.control.replace("{page}", "1").replace("{index}", "1"))?;
    }

    match config.strategy {
        StrategyKind::DirectUrl => {
            let template = config.url_template.as_deref().ok_or_else(|| {
                ConfigError::Validation("direct-url strategy needs url-template".to_string())
            })?;

            if !template.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "url-template '{}' must contain {{page}}",
                    template
                )));
            }

            if template.contains("{product_id}") {
                let has_capture = rules.iter().any(|rule| {
                    rule.kind == RuleKind::Product
                        && Regex::new(&rule.pattern)
                            .map(|re| re.capture_names().flatten().any(|name| name == "id"))
                            .unwrap_or(false)
                });
                if !has_capture {
                    return Err(ConfigError::Validation(
                        "url-template uses {product_id} but no product rule has an 'id' capture group"
                            .to_string(),
                    ));
                }
            }
        }
        StrategyKind::DriveControl => {
            if config.pager.is_none() {
                return Err(ConfigError::Validation(
                    "drive-control strategy needs a [reviews.pager] section".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a CSS selector parses
pub(crate) fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    compile_selector(selector).map(|_| ())
}

/// Parses a CSS selector, mapping failures onto `ConfigError`
pub(crate) fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

/// Checks that a string is an absolute http(s) URL
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
