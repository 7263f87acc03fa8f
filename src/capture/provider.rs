//! Capture device abstraction.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DeviceError;
use crate::media::MediaChunk;

/// Kind of capture device reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Camera,
    Microphone,
}

/// A capture device visible to enumeration, before any permission
/// prompt has been issued.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

/// Requested stream shape. The provider may deliver a smaller frame
/// but never a larger one.
#[derive(Debug, Clone, Copy)]
pub struct StreamConstraints {
    pub max_width: u32,
    pub max_height: u32,
    pub audio: bool,
}

/// Events pushed by a live stream's chunk producer.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    Data(MediaChunk),
    /// The underlying recorder failed mid-capture.
    Failed { message: String },
}

/// An owned handle to an open camera/microphone stream.
///
/// Exactly one session owns a given stream; the session closes it
/// exactly once per open.
pub trait DeviceStream: std::fmt::Debug + Send + Sync {
    /// Stable identity of the underlying stream.
    fn id(&self) -> &str;

    /// Mime type the stream's encoder produces.
    fn mime_type(&self) -> String;

    /// Frame dimensions actually delivered by the device.
    fn frame_dimensions(&self) -> (u32, u32);

    /// Begin pushing encoded chunks into `tx`, one per `interval`,
    /// until `stop_chunks` is called.
    fn start_chunks(
        &self,
        tx: mpsc::UnboundedSender<ChunkEvent>,
        interval: Duration,
    ) -> Result<(), DeviceError>;

    /// Stop the chunk producer. Idempotent.
    fn stop_chunks(&self);

    /// Whether the attached preview surface is currently paused.
    fn preview_paused(&self) -> bool;

    /// Resume a paused preview surface. Recording must never begin
    /// against a paused preview.
    fn resume_preview(&self) -> Result<(), DeviceError>;

    /// Stop every track. Idempotent.
    fn close(&self);
}

/// Host-supplied device access.
#[async_trait]
pub trait CaptureDeviceProvider: Send + Sync {
    /// Enumerate capture devices without prompting for permission.
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Request an open stream. May suspend on a permission prompt.
    async fn open_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<Box<dyn DeviceStream>, DeviceError>;

    /// Release a stream handle, stopping any remaining tracks.
    fn close_stream(&self, stream: Box<dyn DeviceStream>) {
        stream.close();
    }
}

/// Capability probe: whether a camera is present, computed once at
/// mount. Enumeration failures and an empty device list both read as
/// "no camera", and the caller must then never request a stream, so no
/// permission prompt is ever issued.
pub async fn device_available(provider: &dyn CaptureDeviceProvider) -> bool {
    match provider.list_devices().await {
        Ok(devices) => devices.iter().any(|d| d.kind == DeviceKind::Camera),
        Err(e) => {
            debug!("device enumeration failed: {e}");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider used across the crate's unit tests.

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    pub struct FakeStreamState {
        pub chunk_producer_active: AtomicBool,
        pub closed: AtomicBool,
        pub preview_paused: AtomicBool,
        pub resume_calls: AtomicUsize,
    }

    #[derive(Debug)]
    pub struct FakeStream {
        pub stream_id: String,
        pub state: Arc<FakeStreamState>,
        /// Chunks pushed synchronously when the producer starts.
        pub scripted_chunks: Vec<Vec<u8>>,
        /// When set, the producer reports this failure after the
        /// scripted chunks.
        pub fail_with: Option<String>,
    }

    impl DeviceStream for FakeStream {
        fn id(&self) -> &str {
            &self.stream_id
        }

        fn mime_type(&self) -> String {
            "video/webm".to_string()
        }

        fn frame_dimensions(&self) -> (u32, u32) {
            (1280, 720)
        }

        fn start_chunks(
            &self,
            tx: mpsc::UnboundedSender<ChunkEvent>,
            _interval: Duration,
        ) -> Result<(), DeviceError> {
            self.state.chunk_producer_active.store(true, Ordering::SeqCst);
            for data in &self.scripted_chunks {
                let _ = tx.send(ChunkEvent::Data(MediaChunk { data: data.clone() }));
            }
            if let Some(message) = &self.fail_with {
                let _ = tx.send(ChunkEvent::Failed {
                    message: message.clone(),
                });
            }
            Ok(())
        }

        fn stop_chunks(&self) {
            self.state.chunk_producer_active.store(false, Ordering::SeqCst);
        }

        fn preview_paused(&self) -> bool {
            self.state.preview_paused.load(Ordering::SeqCst)
        }

        fn resume_preview(&self) -> Result<(), DeviceError> {
            self.state.resume_calls.fetch_add(1, Ordering::SeqCst);
            self.state.preview_paused.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.state.closed.store(true, Ordering::SeqCst);
        }
    }

    pub struct FakeProvider {
        pub devices: Vec<DeviceInfo>,
        pub open_calls: AtomicUsize,
        pub open_result: Option<DeviceError>,
        pub stream_state: Arc<FakeStreamState>,
        pub scripted_chunks: Vec<Vec<u8>>,
        pub fail_with: Option<String>,
    }

    impl FakeProvider {
        pub fn with_camera() -> Self {
            Self {
                devices: vec![DeviceInfo {
                    id: "cam0".to_string(),
                    label: "Front Camera".to_string(),
                    kind: DeviceKind::Camera,
                }],
                open_calls: AtomicUsize::new(0),
                open_result: None,
                stream_state: Arc::new(FakeStreamState::default()),
                scripted_chunks: vec![vec![1u8; 4], vec![2u8; 4]],
                fail_with: None,
            }
        }

        pub fn without_devices() -> Self {
            Self {
                devices: Vec::new(),
                ..Self::with_camera()
            }
        }

        pub fn opens(&self) -> usize {
            self.open_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CaptureDeviceProvider for FakeProvider {
        async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
            Ok(self.devices.clone())
        }

        async fn open_stream(
            &self,
            _constraints: StreamConstraints,
        ) -> Result<Box<dyn DeviceStream>, DeviceError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.open_result {
                return Err(err.clone());
            }
            Ok(Box::new(FakeStream {
                stream_id: format!("stream-{}", self.opens()),
                state: self.stream_state.clone(),
                scripted_chunks: self.scripted_chunks.clone(),
                fail_with: self.fail_with.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;

    #[tokio::test]
    async fn probe_reports_camera_presence() {
        let provider = FakeProvider::with_camera();
        assert!(device_available(&provider).await);
    }

    #[tokio::test]
    async fn probe_is_false_without_devices_and_never_opens() {
        let provider = FakeProvider::without_devices();
        assert!(!device_available(&provider).await);
        assert_eq!(provider.opens(), 0);
    }
}
