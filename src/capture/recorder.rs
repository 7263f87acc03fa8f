//! Recorder: accumulates encoded chunks from an open capture session.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::provider::ChunkEvent;
use super::session::{CaptureSession, SessionState};
use crate::error::CheckinError;
use crate::media::{MediaChunk, PreviewHandle, PreviewRegistry, RecordedMedia};
use crate::task::ScheduledTask;

/// Buffer for encoded chunks accumulated during one recording.
#[derive(Debug, Default)]
struct ChunkBuffer {
    chunks: Vec<MediaChunk>,
}

impl ChunkBuffer {
    fn push(&mut self, chunk: MediaChunk) {
        self.chunks.push(chunk);
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }

    fn clear(&mut self) {
        self.chunks.clear();
    }

    fn drain(&mut self) -> Vec<MediaChunk> {
        std::mem::take(&mut self.chunks)
    }
}

/// Consumes the open stream of a [`CaptureSession`] and assembles one
/// [`RecordedMedia`] per attempt.
pub struct Recorder {
    chunk_interval: Duration,
    previews: PreviewRegistry,
    buffer: ChunkBuffer,
    started_at: Option<Instant>,
    mime_type: Option<String>,
    frame_dimensions: Option<(u32, u32)>,
    /// Wall-clock counter task, for display and duration metadata.
    clock: Option<ScheduledTask>,
    elapsed_tx: watch::Sender<u64>,
    /// Handle from the previous attempt; revoked before a new one is
    /// created.
    last_preview: Option<PreviewHandle>,
}

impl Recorder {
    pub fn new(chunk_interval: Duration, previews: PreviewRegistry) -> Self {
        let (elapsed_tx, _) = watch::channel(0);
        Self {
            chunk_interval,
            previews,
            buffer: ChunkBuffer::default(),
            started_at: None,
            mime_type: None,
            frame_dimensions: None,
            clock: None,
            elapsed_tx,
            last_preview: None,
        }
    }

    /// Elapsed whole seconds of the active recording, updated once per
    /// second for display.
    pub fn elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }

    /// Begin accumulating chunks from the session's open stream.
    /// Returns the chunk feed the caller drives into [`push_chunk`].
    ///
    /// [`push_chunk`]: Recorder::push_chunk
    pub fn start(
        &mut self,
        session: &mut CaptureSession,
    ) -> Result<mpsc::UnboundedReceiver<ChunkEvent>, CheckinError> {
        if session.state() != SessionState::Open {
            return Err(CheckinError::Recording(
                "capture session is not open".to_string(),
            ));
        }

        // never record against a paused or missing preview
        session.ensure_preview_live()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stream_id = {
            let stream = session.stream().ok_or_else(|| {
                CheckinError::Recording("capture session has no stream".to_string())
            })?;
            self.mime_type = Some(stream.mime_type());
            self.frame_dimensions = Some(stream.frame_dimensions());
            stream.start_chunks(tx, self.chunk_interval)?;
            stream.id().to_string()
        };
        session.mark_recording();

        self.buffer.clear();
        let started = Instant::now();
        self.started_at = Some(started);
        self.elapsed_tx.send_replace(0);

        let elapsed_tx = self.elapsed_tx.clone();
        self.clock = Some(ScheduledTask::spawn_interval(
            Duration::from_secs(1),
            move || {
                elapsed_tx.send_replace(started.elapsed().as_secs());
            },
        ));

        info!(stream = %stream_id, "recording started");
        Ok(rx)
    }

    /// Feed one event from the chunk producer into the accumulator.
    pub fn push_chunk(&mut self, chunk: MediaChunk) {
        self.buffer.push(chunk);
    }

    /// Finalize the accumulated chunks into one media object.
    ///
    /// Cancels only the per-second clock; the capture session stays
    /// open so the user can re-record without a new permission prompt.
    pub fn stop(&mut self, session: &mut CaptureSession) -> Result<RecordedMedia, CheckinError> {
        if session.state() != SessionState::Recording {
            return Err(CheckinError::Recording(
                "no recording in progress".to_string(),
            ));
        }

        if let Some(stream) = session.stream() {
            stream.stop_chunks();
        }
        session.mark_open();
        self.clock = None;

        let duration_seconds = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let chunk_count = self.buffer.len();
        let bytes: Vec<u8> = self
            .buffer
            .drain()
            .into_iter()
            .flat_map(|c| c.data)
            .collect();

        if bytes.is_empty() {
            warn!("recorder produced no data");
            return Err(CheckinError::Recording(
                "recorder produced no data".to_string(),
            ));
        }

        // superseded handle revoked before a new one is created
        if let Some(previous) = self.last_preview.take() {
            previous.revoke();
        }
        let preview = self.previews.create();
        self.last_preview = Some(preview.clone());

        let (width, height) = self.frame_dimensions.unwrap_or((0, 0));
        let media = RecordedMedia {
            bytes,
            mime_type: self
                .mime_type
                .take()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            duration_seconds,
            width,
            height,
            preview: Some(preview),
        };

        info!(
            chunks = chunk_count,
            size_bytes = media.size_bytes(),
            duration_secs = duration_seconds,
            "recording finalized"
        );
        Ok(media)
    }

    /// Discard the active recording after a mid-capture failure or
    /// teardown. The session stays open.
    pub fn abort(&mut self, session: &mut CaptureSession) {
        if let Some(stream) = session.stream() {
            stream.stop_chunks();
        }
        session.mark_open();
        self.clock = None;
        self.started_at = None;
        if self.buffer.len() > 0 {
            debug!(chunks = self.buffer.len(), "discarding recorded chunks");
        }
        self.buffer.clear();
    }
}
