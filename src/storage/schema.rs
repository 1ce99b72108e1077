//! Database schema definitions
//!
//! This module contains the SQL schema for the crawler's record database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Extracted products, keyed by the per-run sequential id
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    product_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    product_url TEXT NOT NULL,
    original_price REAL NOT NULL,
    discounted_price REAL NOT NULL,
    discount_percent INTEGER NOT NULL,
    total_review_count INTEGER NOT NULL,
    product_info TEXT NOT NULL,
    UNIQUE(run_id, product_id)
);

-- Reviews, streamed in page order
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    product_id INTEGER NOT NULL,
    rating INTEGER NOT NULL,
    submitted_at INTEGER NOT NULL,
    review_text TEXT NOT NULL,
    size TEXT NOT NULL,
    color TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_product ON reviews(run_id, product_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
