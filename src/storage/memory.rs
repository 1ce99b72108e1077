//! In-memory record sink

use crate::storage::traits::{RecordSink, SinkError, SinkResult};
use crate::storage::{ProductRecord, Record, ReviewRecord, RunStatus};
use std::sync::Mutex;

/// Collects records in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
    status: Mutex<Option<RunStatus>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records accepted so far
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn products(&self) -> Vec<ProductRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Record::Product(p) => Some(p.clone()),
                Record::Review(_) => None,
            })
            .collect()
    }

    pub fn reviews(&self) -> Vec<ReviewRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Record::Review(r) => Some(r.clone()),
                Record::Product(_) => None,
            })
            .collect()
    }

    /// Reviews belonging to one product
    pub fn reviews_for(&self, product_id: u64) -> Vec<ReviewRecord> {
        self.reviews()
            .into_iter()
            .filter(|r| r.product_id == product_id)
            .collect()
    }

    /// How the run ended, once `finish` has been called
    pub fn status(&self) -> Option<RunStatus> {
        *self.status.lock().unwrap()
    }
}

impl RecordSink for MemorySink {
    fn accept(&self, record: Record) -> SinkResult<()> {
        if self.status.lock().unwrap().is_some() {
            return Err(SinkError::Finished);
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    fn finish(&self, status: RunStatus) -> SinkResult<()> {
        *self.status.lock().unwrap() = Some(status);
        Ok(())
    }
}
