//! Measurement history sink.
//!
//! The pipeline hands finished outcomes to a [`RecordSink`]; the database
//! behind it is not this crate's concern. [`MemoryStore`] keeps records in
//! process for tests and the CLI.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Modality;

pub const DEFAULT_MIME: &str = "image/jpeg";

/// Guess the mime type of an uploaded image from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(DEFAULT_MIME)
}

/// A finished measurement ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub user_id: u64,
    pub modality: Modality,
    pub image: Vec<u8>,
    pub mime_type: String,
    pub result_text: String,
    /// Feature vector as a JSON object.
    pub features: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    pub created_at: DateTime<Utc>,
}

/// Summary of a stored measurement, without the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: u64,
    pub modality: Modality,
    pub result_text: String,
    pub features: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub trait RecordSink: Send + Sync {
    fn store(&self, record: NewRecord) -> Result<StoredRecord>;

    /// Image bytes and mime type of a stored record.
    fn image(&self, id: u64) -> Result<(Vec<u8>, String)>;

    /// Most recent record of `user_id`, if any.
    fn latest_for_user(&self, user_id: u64) -> Result<Option<RecordSummary>>;
}

#[derive(Debug)]
struct Row {
    id: u64,
    created_at: DateTime<Utc>,
    record: NewRecord,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl RecordSink for MemoryStore {
    fn store(&self, record: NewRecord) -> Result<StoredRecord> {
        let mut rows = self.rows.lock();
        let id = rows.last().map_or(1, |row| row.id + 1);
        let created_at = Utc::now();
        log::debug!(
            "Stored {} record {id} for user {}",
            record.modality,
            record.user_id
        );
        rows.push(Row {
            id,
            created_at,
            record,
        });
        Ok(StoredRecord { id, created_at })
    }

    fn image(&self, id: u64) -> Result<(Vec<u8>, String)> {
        self.rows
            .lock()
            .iter()
            .find(|row| row.id == id)
            .map(|row| (row.record.image.clone(), row.record.mime_type.clone()))
            .ok_or(Error::RecordNotFound(id))
    }

    fn latest_for_user(&self, user_id: u64) -> Result<Option<RecordSummary>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .rev()
            .find(|row| row.record.user_id == user_id)
            .map(|row| RecordSummary {
                id: row.id,
                modality: row.record.modality,
                result_text: row.record.result_text.clone(),
                features: row.record.features.clone(),
                created_at: row.created_at,
            }))
    }
}
