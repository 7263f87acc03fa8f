//! Capture session lifecycle.
//!
//! A session exclusively owns one camera/microphone stream handle.
//! Lifecycle: closed -> open -> (recording) -> open. The stream is
//! closed exactly once per open, on every exit path including drop.

use std::sync::Arc;
use tracing::{debug, info};

use super::provider::{CaptureDeviceProvider, DeviceStream, StreamConstraints};
use crate::error::DeviceError;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Open,
    Recording,
}

/// Owns the device stream handle for one check-in attempt.
pub struct CaptureSession {
    provider: Arc<dyn CaptureDeviceProvider>,
    stream: Option<Box<dyn DeviceStream>>,
    state: SessionState,
}

impl CaptureSession {
    pub fn new(provider: Arc<dyn CaptureDeviceProvider>) -> Self {
        Self {
            provider,
            stream: None,
            state: SessionState::Closed,
        }
    }

    /// Request a stream under `constraints` and attach it to the
    /// preview surface. A no-op returning the existing handle when the
    /// session is already open; a stream is never reopened implicitly
    /// while one is active.
    pub async fn open(
        &mut self,
        constraints: StreamConstraints,
    ) -> Result<&dyn DeviceStream, DeviceError> {
        if let Some(ref stream) = self.stream {
            debug!(stream = stream.id(), "session already open");
            return Ok(stream.as_ref());
        }

        let stream = self.provider.open_stream(constraints).await?;
        info!(stream = stream.id(), "capture session opened");
        self.state = SessionState::Open;
        Ok(&**self.stream.insert(stream))
    }

    /// Resume the preview surface if it is paused. Recording must never
    /// begin against a paused or missing preview.
    pub fn ensure_preview_live(&self) -> Result<(), DeviceError> {
        let stream = self.stream.as_deref().ok_or(DeviceError::NotReadable)?;
        if stream.preview_paused() {
            debug!(stream = stream.id(), "resuming paused preview surface");
            stream.resume_preview()?;
        }
        Ok(())
    }

    /// Stop every track of the owned stream. Idempotent; runs on every
    /// exit path (success, error, teardown).
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!(stream = stream.id(), "closing capture session");
            self.provider.close_stream(stream);
        }
        self.state = SessionState::Closed;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&dyn DeviceStream> {
        self.stream.as_deref()
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream.as_deref().map(|s| s.id())
    }

    pub(crate) fn mark_recording(&mut self) {
        debug_assert_eq!(self.state, SessionState::Open);
        self.state = SessionState::Recording;
    }

    pub(crate) fn mark_open(&mut self) {
        if self.stream.is_some() {
            self.state = SessionState::Open;
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // the camera must never stay active after the owner disappears
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::super::provider::testing::FakeProvider;
    use super::*;
    use std::sync::atomic::Ordering;

    fn constraints() -> StreamConstraints {
        StreamConstraints {
            max_width: 1280,
            max_height: 720,
            audio: true,
        }
    }

    #[tokio::test]
    async fn open_twice_reuses_the_stream() {
        let provider = Arc::new(FakeProvider::with_camera());
        let mut session = CaptureSession::new(provider.clone());

        session.open(constraints()).await.unwrap();
        let first_id = session.stream_id().unwrap().to_string();
        session.open(constraints()).await.unwrap();

        assert_eq!(provider.opens(), 1);
        assert_eq!(session.stream_id().unwrap(), first_id);
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn open_surfaces_device_errors() {
        let provider = Arc::new(FakeProvider {
            open_result: Some(DeviceError::NotAllowed),
            ..FakeProvider::with_camera()
        });
        let mut session = CaptureSession::new(provider);

        let err = session.open(constraints()).await.unwrap_err();
        assert_eq!(err, DeviceError::NotAllowed);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let provider = Arc::new(FakeProvider::with_camera());
        let mut session = CaptureSession::new(provider.clone());
        session.open(constraints()).await.unwrap();

        session.close();
        session.close();

        assert!(provider.stream_state.closed.load(Ordering::SeqCst));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn drop_closes_the_stream() {
        let provider = Arc::new(FakeProvider::with_camera());
        {
            let mut session = CaptureSession::new(provider.clone());
            session.open(constraints()).await.unwrap();
        }
        assert!(provider.stream_state.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn ensure_preview_live_resumes_a_paused_surface() {
        let provider = Arc::new(FakeProvider::with_camera());
        provider.stream_state.preview_paused.store(true, Ordering::SeqCst);
        let mut session = CaptureSession::new(provider.clone());
        session.open(constraints()).await.unwrap();

        session.ensure_preview_live().unwrap();
        assert_eq!(provider.stream_state.resume_calls.load(Ordering::SeqCst), 1);
        assert!(!provider.stream_state.preview_paused.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn ensure_preview_live_fails_without_a_stream() {
        let provider = Arc::new(FakeProvider::with_camera());
        let session = CaptureSession::new(provider);
        assert_eq!(
            session.ensure_preview_live().unwrap_err(),
            DeviceError::NotReadable
        );
    }
}
