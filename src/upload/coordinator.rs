//! One upload attempt end to end: pre-flight checks, the transfer, and
//! the synthesized progress signal.
//!
//! The platform exposes no byte-accurate transfer progress, so progress
//! is estimated from elapsed time and the probed throughput. The
//! estimate is monotonically non-decreasing, capped below 100 until the
//! backend confirms completion, and its timer is owned by the job so it
//! is torn down on every exit path.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::quota::QuotaService;
use super::storage::StorageBackend;
use crate::config::UploadConfig;
use crate::error::CheckinError;
use crate::media::RecordedMedia;
use crate::net::NetworkClass;
use crate::task::ScheduledTask;

/// Destination path `{user}-{date}-{timestamp}.{ext}`. The timestamp
/// makes keys unique across retries for the same day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationKey(String);

impl DestinationKey {
    pub fn new(user_id: &str, date: NaiveDate, timestamp_ms: i64, extension: &str) -> Self {
        Self(format!("{user_id}-{date}-{timestamp_ms}.{extension}"))
    }

    pub fn for_now(user_id: &str, date: NaiveDate, extension: &str) -> Self {
        Self::new(user_id, date, Utc::now().timestamp_millis(), extension)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// One attempt to transfer a recorded clip to durable storage.
pub struct UploadJob {
    pub id: Uuid,
    destination: DestinationKey,
    status: JobStatus,
    progress_tx: watch::Sender<u8>,
}

impl UploadJob {
    pub fn new(destination: DestinationKey) -> Self {
        let (progress_tx, _) = watch::channel(0);
        Self {
            id: Uuid::new_v4(),
            destination,
            status: JobStatus::Pending,
            progress_tx,
        }
    }

    pub fn destination(&self) -> &DestinationKey {
        &self.destination
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Progress estimate in percent, [0, 100].
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress_tx.subscribe()
    }
}

/// Runs upload jobs against the storage backend, gated by the size
/// ceiling and the optional quota collaborator.
pub struct UploadCoordinator {
    storage: Arc<dyn StorageBackend>,
    quota: Option<Arc<dyn QuotaService>>,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        quota: Option<Arc<dyn QuotaService>>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            quota,
            config,
        }
    }

    /// Run one attempt. On failure the caller's media is untouched, so
    /// a retry re-uses the same bytes without re-recording.
    pub async fn upload(
        &self,
        media: &RecordedMedia,
        user_id: &str,
        job: &mut UploadJob,
        network: &NetworkClass,
    ) -> Result<String, CheckinError> {
        // fails closed before any network activity
        if media.size_bytes() > self.config.max_size_bytes {
            job.status = JobStatus::Failed;
            warn!(
                size_bytes = media.size_bytes(),
                limit_bytes = self.config.max_size_bytes,
                "clip over the upload ceiling"
            );
            return Err(CheckinError::SizeLimitExceeded {
                size_bytes: media.size_bytes(),
                limit_bytes: self.config.max_size_bytes,
            });
        }

        // the quota collaborator is consulted before any storage write
        if let Some(quota) = &self.quota {
            let decision = quota.check_allowance(user_id).await.map_err(|e| {
                job.status = JobStatus::Failed;
                CheckinError::Upload(format!("quota check failed: {e:#}"))
            })?;
            if !decision.allowed {
                job.status = JobStatus::Failed;
                info!(user_id, "upload denied by quota service");
                return Err(CheckinError::QuotaExceeded {
                    message: decision.message,
                });
            }
        }

        job.status = JobStatus::InFlight;
        info!(
            job_id = %job.id,
            destination = %job.destination,
            size_bytes = media.size_bytes(),
            "upload starting"
        );

        // estimator aborted on every exit path via its owner
        let _estimator = ProgressEstimator::start(
            media.size_bytes(),
            network.throughput_bytes_per_sec,
            &self.config,
            job.progress_tx.clone(),
        );

        let result = self
            .storage
            .put_object(job.destination.as_str(), &media.bytes, &media.mime_type)
            .await;

        match result {
            Ok(public_url) => {
                // 100 exactly once, only on backend confirmation
                job.progress_tx.send_replace(100);
                job.status = JobStatus::Succeeded;
                info!(job_id = %job.id, %public_url, "upload complete");
                Ok(public_url)
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                error!(job_id = %job.id, "upload failed: {e:#}");
                Err(CheckinError::Upload(format!("{e:#}")))
            }
        }
    }
}

/// Owned timer publishing `min(elapsed / estimated_total * 100, cap)`.
struct ProgressEstimator {
    _task: ScheduledTask,
}

impl ProgressEstimator {
    fn start(
        size_bytes: u64,
        throughput_bytes_per_sec: f64,
        config: &UploadConfig,
        tx: watch::Sender<u8>,
    ) -> Self {
        let throughput = throughput_bytes_per_sec.max(1.0);
        let estimated_total_secs = (size_bytes as f64 / throughput).max(0.001);
        let cap = config.progress_cap_percent;
        let started = Instant::now();

        let task = ScheduledTask::spawn_interval(
            Duration::from_millis(config.progress_tick_ms),
            move || {
                let elapsed = started.elapsed().as_secs_f64();
                let pct = ((elapsed / estimated_total_secs) * 100.0).min(cap as f64) as u8;
                // non-decreasing for the duration of one job
                tx.send_if_modified(|current| {
                    if pct > *current {
                        *current = pct;
                        true
                    } else {
                        false
                    }
                });
            },
        );

        Self { _task: task }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeQuota, FakeStorage};
    use super::*;
    use crate::net::testing::normal_link;

    fn media_of(len: usize) -> RecordedMedia {
        RecordedMedia {
            bytes: vec![9u8; len],
            mime_type: "video/webm".to_string(),
            duration_seconds: 8.0,
            width: 1280,
            height: 720,
            preview: None,
        }
    }

    fn key() -> DestinationKey {
        DestinationKey::new("user-1", NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(), 17, "webm")
    }

    #[test]
    fn destination_key_format_is_stable() {
        assert_eq!(key().as_str(), "user-1-2026-08-06-17.webm");
    }

    #[test]
    fn destination_keys_differ_across_retries() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let first = DestinationKey::new("u", date, 1000, "webm");
        let second = DestinationKey::new("u", date, 1001, "webm");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn oversize_clip_is_rejected_before_any_network_call() {
        let storage = Arc::new(FakeStorage::new());
        let quota = Arc::new(FakeQuota::allowing());
        let coordinator = UploadCoordinator::new(
            storage.clone(),
            Some(quota.clone()),
            UploadConfig::default(),
        );
        let media = media_of(101 * 1024 * 1024);
        let mut job = UploadJob::new(key());

        let err = coordinator
            .upload(&media, "user-1", &mut job, &normal_link())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckinError::SizeLimitExceeded { .. }));
        assert_eq!(storage.put_count(), 0);
        assert_eq!(quota.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[tokio::test]
    async fn quota_denial_short_circuits_with_the_message_verbatim() {
        let storage = Arc::new(FakeStorage::new());
        let quota = Arc::new(FakeQuota::denying("Upgrade to keep sharing daily videos"));
        let coordinator =
            UploadCoordinator::new(storage.clone(), Some(quota), UploadConfig::default());
        let media = media_of(1024);
        let mut job = UploadJob::new(key());

        let err = coordinator
            .upload(&media, "user-1", &mut job, &normal_link())
            .await
            .unwrap_err();

        match err {
            CheckinError::QuotaExceeded { message } => {
                assert_eq!(message, "Upgrade to keep sharing daily videos");
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        assert_eq!(storage.put_count(), 0);
    }

    #[tokio::test]
    async fn successful_upload_resolves_the_public_url_at_progress_100() {
        let storage = Arc::new(FakeStorage::new());
        let coordinator = UploadCoordinator::new(storage.clone(), None, UploadConfig::default());
        let media = media_of(2048);
        let mut job = UploadJob::new(key());
        let progress = job.progress();

        let url = coordinator
            .upload(&media, "user-1", &mut job, &normal_link())
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.test/user-1-2026-08-06-17.webm");
        assert_eq!(*progress.borrow(), 100);
        assert_eq!(job.status(), JobStatus::Succeeded);

        let puts = storage.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].content_type, "video/webm");
        assert_eq!(puts[0].bytes.len(), 2048);
    }

    #[tokio::test]
    async fn failed_upload_never_reports_completion() {
        let storage = Arc::new(FakeStorage::failing_times(1));
        let coordinator = UploadCoordinator::new(storage, None, UploadConfig::default());
        let media = media_of(2048);
        let mut job = UploadJob::new(key());
        let progress = job.progress();

        let err = coordinator
            .upload(&media, "user-1", &mut job, &normal_link())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckinError::Upload(_)));
        assert!(*progress.borrow() < 100);
        assert_eq!(job.status(), JobStatus::Failed);
        // the caller still owns the original bytes for a retry
        assert_eq!(media.bytes.len(), 2048);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_capped_until_confirmation() {
        let storage = Arc::new(FakeStorage {
            delay: Duration::from_secs(60),
            ..FakeStorage::new()
        });
        let coordinator = UploadCoordinator::new(storage, None, UploadConfig::default());
        // 10 MB at 1 MB/s: estimated 10s, so the cap is hit long before
        // the 60s transfer confirms
        let media = media_of(10 * 1024 * 1024);
        let network = NetworkClass::classify(1024.0 * 1024.0, 512.0 * 1024.0);
        let mut job = UploadJob::new(key());
        let mut progress_rx = job.progress();

        let samples = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = samples.clone();
        let collector = tokio::spawn(async move {
            while progress_rx.changed().await.is_ok() {
                sink.lock().unwrap().push(*progress_rx.borrow());
            }
        });

        coordinator
            .upload(&media, "user-1", &mut job, &network)
            .await
            .unwrap();

        // sender side of the watch is dropped with the job
        drop(job);
        collector.await.unwrap();

        let samples = samples.lock().unwrap();
        assert!(!samples.is_empty());
        assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
        let (confirmed, in_flight) = samples.split_last().unwrap();
        assert!(in_flight.iter().all(|&p| p <= 95), "{samples:?}");
        assert_eq!(*confirmed, 100);
        // the estimate saturated at the cap while the transfer dragged on
        assert!(in_flight.iter().any(|&p| p == 95));
    }
}
