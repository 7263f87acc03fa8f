//! Recorded media objects and locally-addressable preview handles.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// One encoded chunk pushed by the device stream while recording.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub data: Vec<u8>,
}

/// Registry of live preview handles.
///
/// Preview handles follow the same one-owner rule as the capture
/// stream: a superseded handle must be revoked before a new one is
/// created for the next media object.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a new locally-addressable handle.
    pub fn create(&self) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.lock().insert(id);
        PreviewHandle {
            id,
            url: format!("local-preview://{id}"),
            registry: self.clone(),
        }
    }

    /// Number of handles that have not been revoked.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn revoke(&self, id: Uuid) -> bool {
        self.lock().remove(&id)
    }

    fn contains(&self, id: Uuid) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A revocable reference to locally previewable media, analogous to an
/// object URL handed to the host's preview surface.
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    id: Uuid,
    url: String,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    /// The local address the host points its preview surface at.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the handle is still addressable.
    pub fn is_live(&self) -> bool {
        self.registry.contains(self.id)
    }

    /// Release the local resource. Idempotent.
    pub fn revoke(&self) {
        if self.registry.revoke(self.id) {
            tracing::debug!(url = %self.url, "revoked preview handle");
        }
    }
}

/// The finalized output of one recording attempt, pre- or
/// post-compression.
#[derive(Debug)]
pub struct RecordedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    /// Live preview reference. A transcoded copy carries `None`; the
    /// on-screen preview stays bound to the recorded original.
    pub preview: Option<PreviewHandle>,
}

impl RecordedMedia {
    /// Size of the encoded payload. Always `bytes.len()`.
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Revoke and drop the preview handle, if one is live.
    pub fn revoke_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            preview.revoke();
        }
    }

    /// File extension for the destination key, derived from the mime
    /// type.
    pub fn file_extension(&self) -> &str {
        match self.mime_type.as_str() {
            "video/webm" => "webm",
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            _ => "bin",
        }
    }
}
