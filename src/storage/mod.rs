//! Storage module for extracted records
//!
//! This module handles everything downstream of extraction:
//! - The product and review record types
//! - The `RecordSink` trait the crawl streams records into
//! - A SQLite sink that persists records per crawl run
//! - An in-memory sink for previews and tests

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemorySink;
pub use sqlite::{load_stored_counts, SqliteSink, StoredCounts};
pub use traits::{RecordSink, SinkError, SinkResult};

/// A product extracted from a rendered product page
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Sequential id assigned at extraction time, not taken from the site
    pub product_id: u64,
    pub name: String,
    pub product_url: String,
    pub original_price: f64,
    /// Zero when there is no discount
    pub discounted_price: f64,
    pub discount_percent: u32,
    /// Read once from the product page and never re-read
    pub total_review_count: u32,
    /// Ordered (label, value) pairs
    pub attributes: Vec<(String, String)>,
}

impl ProductRecord {
    /// Flattens the attributes into `label + value + ";"` per pair
    pub fn flattened_attributes(&self) -> String {
        self.attributes
            .iter()
            .map(|(label, value)| format!("{}{};", label, value))
            .collect()
    }
}

/// A single review scraped from a review page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRecord {
    /// The `product_id` of the product this review belongs to
    pub product_id: u64,
    /// Number of selected stars, 0 to 5
    pub rating: u8,
    /// Unix timestamp, or 0 if the date could not be parsed
    pub submitted_at: i64,
    pub text: String,
    pub size: String,
    pub color: String,
}

/// A finished record on its way to a sink
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Product(ProductRecord),
    Review(ReviewRecord),
}

impl Record {
    pub fn product_id(&self) -> u64 {
        match self {
            Self::Product(p) => p.product_id,
            Self::Review(r) => r.product_id,
        }
    }
}

impl From<ProductRecord> for Record {
    fn from(record: ProductRecord) -> Self {
        Self::Product(record)
    }
}

impl From<ReviewRecord> for Record {
    fn from(record: ReviewRecord) -> Self {
        Self::Review(record)
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            let parsed = RunStatus::from_db_string(status.to_db_string());
            assert_eq!(Some(*status), parsed);
        }
        assert_eq!(RunStatus::from_db_string("interrupted"), None);
    }

    #[test]
    fn test_flattened_attributes() {
        let product = ProductRecord {
            product_id: 0,
            name: "Zip Hoodie".to_string(),
            product_url: "https://shop.example.com/zip-product1.html".to_string(),
            original_price: 20.0,
            discounted_price: 0.0,
            discount_percent: 0,
            total_review_count: 0,
            attributes: vec![
                ("Material:".to_string(), "Cotton".to_string()),
                ("Style:".to_string(), "Casual".to_string()),
            ],
        };
        assert_eq!(product.flattened_attributes(), "Material:Cotton;Style:Casual;");
    }

    #[test]
    fn test_record_product_id() {
        let review = ReviewRecord {
            product_id: 7,
            rating: 5,
            submitted_at: 0,
            text: String::new(),
            size: String::new(),
            color: String::new(),
        };
        assert_eq!(Record::from(review).product_id(), 7);
    }
}
