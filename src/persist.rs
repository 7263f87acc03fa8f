//! Check-in record reconciliation.
//!
//! The record store is an external collaborator keyed by
//! `(user_id, date)`. Writes are idempotent merges, so no locking
//! beyond the key's uniqueness is required.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::CheckinError;
use crate::media::RecordedMedia;

/// Lifecycle status of a day's check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinStatus {
    #[default]
    Pending,
    Completed,
}

/// The per-user-per-date row a successful upload ultimately updates.
/// Owned by the external store; never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub video_reference: Option<String>,
    pub video_duration_seconds: Option<f64>,
    pub video_size_bytes: Option<u64>,
    pub notes: Option<String>,
    pub status: CheckinStatus,
}

/// Media fields written by a successful upload. Unrelated fields
/// (notes, status) are left untouched when the record already exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinFields {
    pub video_reference: String,
    pub video_duration_seconds: f64,
    pub video_size_bytes: u64,
}

/// Metadata describing the uploaded payload.
#[derive(Debug, Clone, Copy)]
pub struct MediaMetadata {
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

impl From<&RecordedMedia> for MediaMetadata {
    fn from(media: &RecordedMedia) -> Self {
        Self {
            duration_seconds: media.duration_seconds,
            size_bytes: media.size_bytes(),
        }
    }
}

/// External record store for check-ins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create-or-merge the record for `(user_id, date)`: created with a
    /// default status when absent, otherwise only the media fields are
    /// updated in place.
    async fn upsert_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
        fields: CheckinFields,
    ) -> Result<()>;

    async fn get_checkin(&self, user_id: &str, date: NaiveDate) -> Result<Option<CheckinRecord>>;
}

/// Reconciles an uploaded media reference into the day's record.
pub struct PersistenceSynchronizer {
    store: Arc<dyn RecordStore>,
}

impl PersistenceSynchronizer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Upsert the media reference for `(user_id, date)`. Safe to call
    /// twice with the same reference; the second call is a no-op merge.
    ///
    /// A failure here happens after the media is already durable, so it
    /// surfaces as [`CheckinError::Persistence`] carrying the saved
    /// reference rather than discarding the upload.
    pub async fn save(
        &self,
        user_id: &str,
        date: NaiveDate,
        reference: &str,
        metadata: MediaMetadata,
    ) -> Result<(), CheckinError> {
        let fields = CheckinFields {
            video_reference: reference.to_string(),
            video_duration_seconds: metadata.duration_seconds,
            video_size_bytes: metadata.size_bytes,
        };

        self.store
            .upsert_checkin(user_id, date, fields)
            .await
            .map_err(|e| {
                error!(user_id, %date, "check-in upsert failed: {e:#}");
                CheckinError::Persistence {
                    message: format!("{e:#}"),
                    reference: reference.to_string(),
                }
            })?;

        debug!(user_id, %date, reference, "check-in record reconciled");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory record store with the external store's merge
    /// semantics.
    #[derive(Default)]
    pub struct MemoryRecordStore {
        pub records: Mutex<HashMap<(String, NaiveDate), CheckinRecord>>,
        pub fail_times: AtomicUsize,
    }

    impl MemoryRecordStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_times(times: usize) -> Self {
            Self {
                fail_times: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        pub fn record_count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryRecordStore {
        async fn upsert_checkin(
            &self,
            user_id: &str,
            date: NaiveDate,
            fields: CheckinFields,
        ) -> Result<()> {
            if self
                .fail_times
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("record store unavailable");
            }

            let mut records = self.records.lock().unwrap();
            let record = records
                .entry((user_id.to_string(), date))
                .or_insert_with(|| CheckinRecord {
                    user_id: user_id.to_string(),
                    date,
                    video_reference: None,
                    video_duration_seconds: None,
                    video_size_bytes: None,
                    notes: None,
                    status: CheckinStatus::default(),
                });
            record.video_reference = Some(fields.video_reference);
            record.video_duration_seconds = Some(fields.video_duration_seconds);
            record.video_size_bytes = Some(fields.video_size_bytes);
            Ok(())
        }

        async fn get_checkin(
            &self,
            user_id: &str,
            date: NaiveDate,
        ) -> Result<Option<CheckinRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), date))
                .cloned())
        }
    }
}
