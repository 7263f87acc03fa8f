//! Daily video check-in pipeline.
//!
//! Captures a short testimonial clip from the user's camera, decides
//! whether to re-encode it under network- and size-adaptive constraints,
//! uploads it with a synthesized progress signal, and reconciles the
//! resulting media reference into the per-user-per-day check-in record.
//!
//! Device access, durable storage, the quota check, and the record store
//! are supplied by the host through trait collaborators. The pipeline
//! owns the resource lifetimes in between: the camera stream, the
//! recording clock, the preview handle, and the progress task are each
//! bound to exactly one owner and torn down on every exit path.

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod net;
pub mod persist;
pub mod pipeline;
pub mod task;
pub mod transcode;
pub mod upload;

pub use capture::{
    device_available, CaptureDeviceProvider, CaptureSession, ChunkEvent, DeviceInfo, DeviceKind,
    DeviceStream, Recorder, SessionState, StreamConstraints,
};
pub use config::PipelineConfig;
pub use error::{CheckinError, DeviceError};
pub use media::{MediaChunk, PreviewHandle, PreviewRegistry, RecordedMedia};
pub use net::{HttpNetworkProbe, LinkTier, NetworkClass, NetworkProbe};
pub use persist::{
    CheckinFields, CheckinRecord, CheckinStatus, MediaMetadata, PersistenceSynchronizer,
    RecordStore,
};
pub use pipeline::{
    create_pipeline_channels, CheckinEngine, Collaborators, PipelineCommand, Retreat, ViewState,
};
pub use transcode::{AdaptiveTranscoder, TranscodeBackend, TranscodeProfile};
pub use upload::{
    DestinationKey, HttpQuotaService, HttpStorageBackend, JobStatus, QuotaDecision, QuotaService,
    StorageBackend, UploadCoordinator, UploadJob,
};
