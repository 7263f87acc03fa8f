//! Error taxonomy for the check-in pipeline.
//!
//! Every failure reaches the view state machine as one of these typed
//! causes; nothing is collapsed into a generic failure string.

use thiserror::Error;

/// Device acquisition failures, distinguished so the host can offer the
/// right remedy (settings change, retry, or a disabled affordance).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("camera access was denied")]
    NotAllowed,

    #[error("no capture device found")]
    NotFound,

    #[error("capture device is busy or unreadable")]
    NotReadable,

    #[error("device error: {0}")]
    Other(String),
}

/// Pipeline failures surfaced to the host UI.
#[derive(Debug, Clone, Error)]
pub enum CheckinError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Mid-capture failure. The capture session stays open.
    #[error("recording failed: {0}")]
    Recording(String),

    /// Rejected pre-flight, before any network activity.
    #[error("clip is {size_bytes} bytes, over the {limit_bytes} byte upload limit")]
    SizeLimitExceeded { size_bytes: u64, limit_bytes: u64 },

    /// The quota collaborator denied the upload. `message` is the
    /// service's wording, surfaced verbatim as an upgrade prompt.
    #[error("{message}")]
    QuotaExceeded { message: String },

    /// Transfer failure after the upload began. The original bytes are
    /// retained by the caller for a retry without re-recording.
    #[error("upload failed: {0}")]
    Upload(String),

    /// The record upsert failed after the media was already durable.
    /// `reference` is the saved public URL, so the upload is not lost.
    #[error("video uploaded but the check-in record was not updated: {message}")]
    Persistence { message: String, reference: String },
}

impl CheckinError {
    /// Whether the recorded bytes survive this failure, i.e. whether a
    /// retry can go back to the preview instead of the camera.
    pub fn retains_media(&self) -> bool {
        matches!(
            self,
            CheckinError::SizeLimitExceeded { .. }
                | CheckinError::QuotaExceeded { .. }
                | CheckinError::Upload(_)
                | CheckinError::Persistence { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_message_surfaces_verbatim() {
        let err = CheckinError::QuotaExceeded {
            message: "Upgrade to keep sharing daily videos".to_string(),
        };
        assert_eq!(err.to_string(), "Upgrade to keep sharing daily videos");
    }

    #[test]
    fn device_errors_do_not_retain_media() {
        assert!(!CheckinError::Device(DeviceError::NotAllowed).retains_media());
        assert!(!CheckinError::Recording("encoder died".into()).retains_media());
        assert!(CheckinError::Upload("timeout".into()).retains_media());
        assert!(CheckinError::Persistence {
            message: "store offline".into(),
            reference: "https://cdn/x.webm".into(),
        }
        .retains_media());
    }
}
