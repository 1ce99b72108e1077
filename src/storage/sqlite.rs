//! SQLite record sink
//!
//! This module provides a SQLite-backed implementation of `RecordSink`. Each
//! crawl gets a row in `runs`; products and reviews are appended under that
//! run id.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, SinkError, SinkResult};
use crate::storage::{ProductRecord, Record, ReviewRecord, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite sink for a single crawl run
pub struct SqliteSink {
    conn: Mutex<Connection>,
    run_id: i64,
}

impl SqliteSink {
    /// Opens (or creates) the database and starts a new run
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `config_hash` - Hash of the configuration driving this run
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Database ready and run row created
    /// * `Err(SinkError)` - Failed to open the database or create the run
    pub fn open(path: &Path, config_hash: &str) -> SinkResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::with_connection(conn, config_hash)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(config_hash: &str) -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn, config_hash)
    }

    fn with_connection(conn: Connection, config_hash: &str) -> SinkResult<Self> {
        initialize_schema(&conn)?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        let run_id = conn.last_insert_rowid();

        tracing::debug!("Started run {} in record database", run_id);

        Ok(Self {
            conn: Mutex::new(conn),
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Gets this sink's run row
    pub fn run(&self) -> SinkResult<RunRecord> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![self.run_id],
                read_run,
            )
            .optional()?;

        run.ok_or_else(|| SinkError::Database(format!("run {} not found", self.run_id)))
    }

    fn insert_product(conn: &Connection, run_id: i64, product: &ProductRecord) -> SinkResult<()> {
        conn.execute(
            "INSERT INTO products (run_id, product_id, name, product_url, original_price,
                discounted_price, discount_percent, total_review_count, product_info)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                product.product_id as i64,
                product.name,
                product.product_url,
                product.original_price,
                product.discounted_price,
                product.discount_percent,
                product.total_review_count,
                product.flattened_attributes(),
            ],
        )?;
        Ok(())
    }

    fn insert_review(conn: &Connection, run_id: i64, review: &ReviewRecord) -> SinkResult<()> {
        conn.execute(
            "INSERT INTO reviews (run_id, product_id, rating, submitted_at, review_text, size, color)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                review.product_id as i64,
                review.rating,
                review.submitted_at,
                review.text,
                review.size,
                review.color,
            ],
        )?;
        Ok(())
    }
}

impl RecordSink for SqliteSink {
    fn accept(&self, record: Record) -> SinkResult<()> {
        let conn = self.conn.lock().unwrap();
        match &record {
            Record::Product(product) => Self::insert_product(&conn, self.run_id, product),
            Record::Review(review) => Self::insert_review(&conn, self.run_id, review),
        }
    }

    fn finish(&self, status: RunStatus) -> SinkResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, self.run_id],
        )?;
        tracing::debug!("Run {} marked {}", self.run_id, status.to_db_string());
        Ok(())
    }
}

fn read_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

/// Record counts stored in an existing database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCounts {
    pub runs: u64,
    pub products: u64,
    pub reviews: u64,
    pub latest_run: Option<(i64, String)>,
    /// Products stored by the latest run
    pub latest_products: u64,
    pub latest_reviews: u64,
}

/// Reads record counts from an existing database without starting a run
pub fn load_stored_counts(path: &Path) -> SinkResult<StoredCounts> {
    if !path.exists() {
        return Err(SinkError::Database(format!(
            "database {} does not exist",
            path.display()
        )));
    }

    let conn = Connection::open(path)?;
    initialize_schema(&conn)?;

    let count = |sql: &str| -> SinkResult<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    let mut counts = StoredCounts {
        runs: count("SELECT COUNT(*) FROM runs")?,
        products: count("SELECT COUNT(*) FROM products")?,
        reviews: count("SELECT COUNT(*) FROM reviews")?,
        ..Default::default()
    };

    let latest: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, status FROM runs ORDER BY id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((run_id, _)) = &latest {
        let per_run = |table: &str| -> SinkResult<u64> {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE run_id = ?1", table),
                params![run_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        };
        counts.latest_products = per_run("products")?;
        counts.latest_reviews = per_run("reviews")?;
    }
    counts.latest_run = latest;

    Ok(counts)
}
