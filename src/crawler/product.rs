//! Product extraction
//!
//! Turns a rendered product page into a `ProductRecord`. Selectors are
//! best-effort: a field whose selector yields nothing gets its default and the
//! record is still emitted, with the missing field names reported alongside.

use crate::config::{compile_selector, ProductSelectorConfig};
use crate::crawler::gateway::RenderedPage;
use crate::storage::ProductRecord;
use crate::ConfigError;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Run-scoped source of sequential product ids
#[derive(Debug, Default)]
pub struct ProductIdCounter(AtomicU64);

impl ProductIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically takes the next id
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A product record plus the fields that fell back to defaults
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: ProductRecord,
    pub missing: Vec<&'static str>,
}

/// Extracts product records from rendered product pages
pub struct ProductExtractor {
    name: Selector,
    original_price: Selector,
    discount: Selector,
    attribute_labels: Selector,
    attribute_values: Selector,
    review_count: Selector,
    counter: Arc<ProductIdCounter>,
}

impl ProductExtractor {
    /// Compiles the product selectors
    ///
    /// # Arguments
    ///
    /// * `config` - The `[selectors.product]` table
    /// * `counter` - The run's product id counter
    pub fn new(
        config: &ProductSelectorConfig,
        counter: Arc<ProductIdCounter>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: compile_selector(&config.name)?,
            original_price: compile_selector(&config.original_price)?,
            discount: compile_selector(&config.discount)?,
            attribute_labels: compile_selector(&config.attribute_labels)?,
            attribute_values: compile_selector(&config.attribute_values)?,
            review_count: compile_selector(&config.review_count)?,
            counter,
        })
    }

    pub fn counter(&self) -> &Arc<ProductIdCounter> {
        &self.counter
    }

    /// Extracts one product and assigns it the next product id
    ///
    /// The discount is applied to the visible price, which is read as the
    /// original price. Missing review counts default to 0.
    pub fn extract(&self, page: &RenderedPage) -> Extraction {
        let document = page.parse();
        let mut missing = Vec::new();

        let name = first_text(&document, &self.name).unwrap_or_else(|| {
            missing.push("name");
            String::new()
        });

        let original_price = first_text(&document, &self.original_price)
            .and_then(|t| parse_price(&t))
            .unwrap_or_else(|| {
                missing.push("original_price");
                0.0
            });

        let discount_percent = first_text(&document, &self.discount)
            .and_then(|t| parse_count(&t))
            .unwrap_or(0)
            .min(100);

        let labels = all_text(&document, &self.attribute_labels);
        let values = all_text(&document, &self.attribute_values);
        let attributes = pair_attributes(&labels, &values);

        let total_review_count = first_text(&document, &self.review_count)
            .and_then(|t| parse_count(&t))
            .unwrap_or(0);

        let record = ProductRecord {
            product_id: self.counter.next_id(),
            name,
            product_url: page.source_url().to_string(),
            original_price,
            discounted_price: discounted_price(original_price, discount_percent),
            discount_percent,
            total_review_count,
            attributes,
        };

        Extraction { record, missing }
    }
}

/// Applies a percentage discount; no discount means a discounted price of 0
pub fn discounted_price(original_price: f64, discount_percent: u32) -> f64 {
    if discount_percent == 0 {
        return 0.0;
    }
    original_price * discount_percent as f64 / 100.0
}

/// Pairs attribute labels with values
///
/// The first value node is a spacer and the real values sit at every other
/// position after it. Trailing unmatched entries on either side are dropped.
pub fn pair_attributes(labels: &[String], values: &[String]) -> Vec<(String, String)> {
    labels
        .iter()
        .zip(values.iter().skip(1).step_by(2))
        .map(|(label, value)| (label.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parses a price out of node text such as "$1,299.50"
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Parses the digits of node text such as "(12)" or "-20%"
pub fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

pub(crate) fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn all_text(document: &Html, selector: &Selector) -> Vec<String> {
    document.select(selector).map(element_text).collect()
}
