//! Camera capture: capability probing, session ownership, recording.
//!
//! The host platform supplies actual device access through the
//! [`CaptureDeviceProvider`] trait; everything here works against that
//! seam so native mobile and desktop hosts can plug in equivalents.

pub(crate) mod provider;
mod recorder;
mod session;

pub use provider::{
    device_available, CaptureDeviceProvider, ChunkEvent, DeviceInfo, DeviceKind, DeviceStream,
    StreamConstraints,
};
pub use recorder::Recorder;
pub use session::{CaptureSession, SessionState};
