//! The view state machine engine.
//!
//! Single-threaded and event-driven: one `select!` loop over host
//! commands, the recorder's chunk feed, and the recording clock, so
//! recorder start never races a session close and only one upload job
//! is in flight per attempt. Shutdown force-closes the camera no
//! matter which async step is pending.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{debug, error, info, warn};

use super::{PipelineCommand, Retreat, ViewState};
use crate::capture::{
    device_available, CaptureDeviceProvider, CaptureSession, ChunkEvent, Recorder,
    StreamConstraints,
};
use crate::config::PipelineConfig;
use crate::error::{CheckinError, DeviceError};
use crate::media::{PreviewRegistry, RecordedMedia};
use crate::net::NetworkProbe;
use crate::persist::{MediaMetadata, PersistenceSynchronizer, RecordStore};
use crate::transcode::{AdaptiveTranscoder, TranscodeBackend};
use crate::upload::{DestinationKey, QuotaService, StorageBackend, UploadCoordinator, UploadJob};

/// External collaborators supplied by the host.
pub struct Collaborators {
    pub provider: Arc<dyn CaptureDeviceProvider>,
    pub transcoder: Arc<dyn TranscodeBackend>,
    pub probe: Arc<dyn NetworkProbe>,
    pub storage: Arc<dyn StorageBackend>,
    /// Optional; when absent, uploads are not quota-gated.
    pub quota: Option<Arc<dyn QuotaService>>,
    pub records: Arc<dyn RecordStore>,
}

/// Drives one user's daily check-in attempt from camera to saved
/// record.
pub struct CheckinEngine {
    config: PipelineConfig,
    user_id: String,
    provider: Arc<dyn CaptureDeviceProvider>,
    session: CaptureSession,
    recorder: Recorder,
    previews: PreviewRegistry,
    transcoder: AdaptiveTranscoder,
    probe: Arc<dyn NetworkProbe>,
    uploader: UploadCoordinator,
    persistence: PersistenceSynchronizer,
    cmd_rx: mpsc::Receiver<PipelineCommand>,
    status_tx: broadcast::Sender<ViewState>,
    /// Capability probe result, computed once at startup.
    camera_present: bool,
    /// The previewed clip, retained across failed attempts for retry.
    media: Option<RecordedMedia>,
    /// Check-in date captured at the first submit of an attempt, so a
    /// retry that crosses midnight still targets the original day.
    attempt_date: Option<NaiveDate>,
    view: ViewState,
}

impl CheckinEngine {
    pub fn new(
        user_id: impl Into<String>,
        config: PipelineConfig,
        collaborators: Collaborators,
        cmd_rx: mpsc::Receiver<PipelineCommand>,
        status_tx: broadcast::Sender<ViewState>,
    ) -> Self {
        let previews = PreviewRegistry::new();
        let session = CaptureSession::new(collaborators.provider.clone());
        let recorder = Recorder::new(
            Duration::from_millis(config.recording.chunk_interval_ms),
            previews.clone(),
        );
        let transcoder =
            AdaptiveTranscoder::new(collaborators.transcoder, config.compression.clone());
        let uploader = UploadCoordinator::new(
            collaborators.storage,
            collaborators.quota,
            config.upload.clone(),
        );
        let persistence = PersistenceSynchronizer::new(collaborators.records);

        Self {
            config,
            user_id: user_id.into(),
            provider: collaborators.provider,
            session,
            recorder,
            previews,
            transcoder,
            probe: collaborators.probe,
            uploader,
            persistence,
            cmd_rx,
            status_tx,
            camera_present: false,
            media: None,
            attempt_date: None,
            view: ViewState::Camera,
        }
    }

    /// Registry tracking live preview handles, mainly for the host to
    /// audit teardown.
    pub fn preview_registry(&self) -> PreviewRegistry {
        self.previews.clone()
    }

    /// Run the engine main loop
    pub async fn run(&mut self) -> Result<()> {
        info!(user = %self.user_id, "check-in pipeline starting");

        self.camera_present = device_available(self.provider.as_ref()).await;
        if self.camera_present {
            self.set_view(ViewState::Camera);
        } else {
            // disabled affordance: without a device no stream is ever
            // requested, so no permission prompt can appear
            self.fail(CheckinError::Device(DeviceError::NotFound), Retreat::Camera);
        }

        let mut chunk_feed: Option<mpsc::UnboundedReceiver<ChunkEvent>> = None;
        let mut elapsed_rx = self.recorder.elapsed();

        loop {
            tokio::select! {
                // Handle host commands
                Some(cmd) = self.cmd_rx.recv() => {
                    match cmd {
                        PipelineCommand::OpenCamera => self.open_camera().await,
                        PipelineCommand::StartRecording => {
                            match self.start_recording() {
                                Ok(Some(rx)) => chunk_feed = Some(rx),
                                Ok(None) => {}
                                Err(e) => self.fail(e, Retreat::Camera),
                            }
                        }
                        PipelineCommand::StopRecording => {
                            // drain chunks the producer already emitted
                            // before finalizing
                            if let Some(rx) = chunk_feed.as_mut() {
                                while let Ok(event) = rx.try_recv() {
                                    match event {
                                        ChunkEvent::Data(chunk) => self.recorder.push_chunk(chunk),
                                        ChunkEvent::Failed { message } => {
                                            warn!("chunk producer failed while stopping: {message}");
                                        }
                                    }
                                }
                            }
                            chunk_feed = None;
                            self.stop_recording();
                        }
                        PipelineCommand::Submit | PipelineCommand::Retry => {
                            self.submit().await;
                        }
                        PipelineCommand::ReRecord => self.re_record().await,
                        PipelineCommand::Shutdown => {
                            info!("shutdown command received");
                            break;
                        }
                    }
                }

                // Drive the chunk producer into the accumulator
                Some(event) = async {
                    match chunk_feed.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match event {
                        ChunkEvent::Data(chunk) => self.recorder.push_chunk(chunk),
                        ChunkEvent::Failed { message } => {
                            chunk_feed = None;
                            self.recorder.abort(&mut self.session);
                            self.fail(CheckinError::Recording(message), Retreat::Camera);
                        }
                    }
                }

                // Surface the wall-clock counter while recording
                changed = elapsed_rx.changed(), if matches!(self.view, ViewState::Recording { .. }) => {
                    if changed.is_ok() {
                        let elapsed_secs = *elapsed_rx.borrow_and_update();
                        self.set_view(ViewState::Recording { elapsed_secs });
                    }
                }
            }
        }

        self.teardown();
        info!("check-in pipeline stopped");
        Ok(())
    }

    async fn open_camera(&mut self) {
        if !self.camera_present {
            warn!("camera requested without a capture device");
            self.fail(CheckinError::Device(DeviceError::NotFound), Retreat::Camera);
            return;
        }
        if matches!(
            self.view,
            ViewState::Recording { .. } | ViewState::Uploading { .. }
        ) {
            warn!("ignoring camera open while busy");
            return;
        }

        let constraints = StreamConstraints {
            max_width: self.config.recording.max_width,
            max_height: self.config.recording.max_height,
            audio: self.config.recording.capture_audio,
        };
        match self.session.open(constraints).await {
            Ok(_) => self.set_view(ViewState::Camera),
            Err(e) => self.fail(e.into(), Retreat::Camera),
        }
    }

    fn start_recording(
        &mut self,
    ) -> std::result::Result<Option<mpsc::UnboundedReceiver<ChunkEvent>>, CheckinError> {
        if !matches!(self.view, ViewState::Camera) {
            // also covers "no new recording while uploading"
            warn!("ignoring start outside the camera view");
            return Ok(None);
        }
        let rx = self.recorder.start(&mut self.session)?;
        self.set_view(ViewState::Recording { elapsed_secs: 0 });
        Ok(Some(rx))
    }

    fn stop_recording(&mut self) {
        if !matches!(self.view, ViewState::Recording { .. }) {
            debug!("no recording in progress");
            return;
        }
        match self.recorder.stop(&mut self.session) {
            Ok(media) => {
                // the session stays open for an immediate re-record
                self.media = Some(media);
                self.set_view(ViewState::Preview);
            }
            Err(e) => self.fail(e, Retreat::Camera),
        }
    }

    /// One upload attempt: probe, maybe compress, transfer, reconcile.
    async fn submit(&mut self) {
        if !matches!(
            self.view,
            ViewState::Preview
                | ViewState::Error {
                    retreat: Retreat::Preview,
                    ..
                }
        ) {
            warn!("ignoring submit outside the preview");
            return;
        }
        let Some(media) = self.media.take() else {
            warn!("submit without a previewed clip");
            return;
        };

        let date = *self
            .attempt_date
            .get_or_insert_with(|| Utc::now().date_naive());

        self.set_view(ViewState::Uploading { progress: 0 });

        // ephemeral, re-probed on every attempt
        let network = self.probe.measure().await;

        let compressed = if self.transcoder.should_compress(&media, &network) {
            self.transcoder.compress(&media, &network).await
        } else {
            None
        };
        let payload = compressed.as_ref().unwrap_or(&media);

        let key = DestinationKey::for_now(&self.user_id, date, payload.file_extension());
        let mut job = UploadJob::new(key);

        // forward the synthetic estimate to the host while the
        // transfer runs
        let mut progress_updates = WatchStream::new(job.progress());
        let status_tx = self.status_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(progress) = progress_updates.next().await {
                let _ = status_tx.send(ViewState::Uploading { progress });
            }
        });

        let outcome = self
            .uploader
            .upload(payload, &self.user_id, &mut job, &network)
            .await;

        let result = match outcome {
            Ok(public_url) => {
                let metadata = MediaMetadata::from(payload);
                self.persistence
                    .save(&self.user_id, date, &public_url, metadata)
                    .await
                    .map(|_| public_url)
            }
            Err(e) => Err(e),
        };
        forwarder.abort();

        // the recorded bytes are retained in every case, so a retry
        // re-uses them without re-opening the camera
        self.media = Some(media);

        match result {
            Ok(public_url) => {
                info!(user = %self.user_id, %date, "check-in saved");
                self.attempt_date = None;
                self.set_view(ViewState::Success { public_url });
            }
            Err(e) => {
                let retreat = if e.retains_media() {
                    Retreat::Preview
                } else {
                    Retreat::Camera
                };
                self.fail(e, retreat);
            }
        }
    }

    async fn re_record(&mut self) {
        if matches!(
            self.view,
            ViewState::Recording { .. } | ViewState::Uploading { .. }
        ) {
            warn!("ignoring re-record while busy");
            return;
        }

        // exactly one previous preview handle is revoked, before (or
        // without) requesting a new session
        if let Some(mut media) = self.media.take() {
            media.revoke_preview();
        }
        self.attempt_date = None;

        if self.session.is_open() {
            // the stream stayed open, no new permission prompt
            self.set_view(ViewState::Camera);
        } else {
            self.open_camera().await;
        }
    }

    fn teardown(&mut self) {
        self.recorder.abort(&mut self.session);
        if let Some(mut media) = self.media.take() {
            media.revoke_preview();
        }
        // the camera must never stay active after the host goes away
        self.session.close();
    }

    fn set_view(&mut self, view: ViewState) {
        self.view = view.clone();
        let _ = self.status_tx.send(view);
    }

    fn fail(&mut self, cause: CheckinError, retreat: Retreat) {
        error!("check-in pipeline error: {cause}");
        self.set_view(ViewState::Error { cause, retreat });
    }
}
