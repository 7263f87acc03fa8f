//! Check-in pipeline engine - drives the view state machine the host
//! UI renders.

mod engine;

pub use engine::{CheckinEngine, Collaborators};

use tokio::sync::{broadcast, mpsc};

use crate::error::CheckinError;

/// Commands from the host UI.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Open the camera, once the capability probe allows it.
    OpenCamera,
    /// Begin accumulating a clip from the open session.
    StartRecording,
    /// Finalize the clip and move to preview.
    StopRecording,
    /// Upload the previewed clip and reconcile the day's record.
    Submit,
    /// Retry a failed upload or persist with the same bytes.
    Retry,
    /// Discard the preview and record again.
    ReRecord,
    /// Tear down: abort any recording and force-close the camera.
    Shutdown,
}

/// What the host UI should currently show.
#[derive(Debug, Clone)]
pub enum ViewState {
    /// Live camera, ready to record.
    Camera,
    /// Recording in progress, with the wall-clock counter for display.
    Recording { elapsed_secs: u64 },
    /// A finalized clip is available for review.
    Preview,
    /// Transfer in flight, with the synthesized progress estimate.
    Uploading { progress: u8 },
    /// Persistence succeeded; carries the durable public URL (the
    /// host's "video saved" signal).
    Success { public_url: String },
    /// A typed failure and where dismissing it returns to.
    Error { cause: CheckinError, retreat: Retreat },
}

/// Where an error state returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retreat {
    /// Device and recording errors: back to the camera.
    Camera,
    /// Upload and persistence errors: back to the preview, so a retry
    /// re-uses the recorded bytes.
    Preview,
}

/// Create command and status channels for the engine
pub fn create_pipeline_channels() -> (
    mpsc::Sender<PipelineCommand>,
    mpsc::Receiver<PipelineCommand>,
    broadcast::Sender<ViewState>,
    broadcast::Receiver<ViewState>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(64);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}
