//! Adaptive re-encoding of recorded clips.
//!
//! The policy lives here; the actual pixel work is delegated to a
//! host-supplied [`TranscodeBackend`] (codec internals are out of
//! scope). Compression is best-effort: a backend failure or an output
//! that grew falls back to uploading the original, never failing the
//! pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CompressionConfig;
use crate::media::RecordedMedia;
use crate::net::NetworkClass;

/// Calculate output dimensions with aspect-preserving downscale
///
/// Fits the source inside the `max_width` x `max_height` canvas while
/// preserving aspect ratio. Downscale only, never upscale. Ensures
/// dimensions are even (required by most video encoders).
pub fn fit_output_dimensions(
    base_width: u32,
    base_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    if base_width == 0 || base_height == 0 {
        return (make_even(max_width), make_even(max_height));
    }

    let scale_w = max_width as f64 / base_width as f64;
    let scale_h = max_height as f64 / base_height as f64;
    let scale = scale_w.min(scale_h).min(1.0);

    let output_width = (base_width as f64 * scale).round() as u32;
    let output_height = (base_height as f64 * scale).round() as u32;

    (make_even(output_width), make_even(output_height))
}

/// Ensure a value is even (required by most video encoders)
fn make_even(v: u32) -> u32 {
    if v % 2 == 0 {
        v
    } else {
        v + 1
    }
}

/// Encoder settings for one compression pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
}

/// Host-supplied frame-by-frame re-encoder.
#[async_trait]
pub trait TranscodeBackend: Send + Sync {
    /// Render `media` into a new payload under `profile`.
    async fn render(
        &self,
        media: &RecordedMedia,
        profile: TranscodeProfile,
    ) -> anyhow::Result<Vec<u8>>;
}

/// Decides whether and how to re-encode a clip before upload.
pub struct AdaptiveTranscoder {
    backend: Arc<dyn TranscodeBackend>,
    config: CompressionConfig,
}

impl AdaptiveTranscoder {
    pub fn new(backend: Arc<dyn TranscodeBackend>, config: CompressionConfig) -> Self {
        Self { backend, config }
    }

    /// True iff the clip is over the size trigger or the link is slow.
    pub fn should_compress(&self, media: &RecordedMedia, network: &NetworkClass) -> bool {
        media.size_bytes() > self.config.trigger_size_bytes || network.is_slow()
    }

    /// Profile for the given source dimensions and link tier.
    pub fn profile_for(&self, source: (u32, u32), network: &NetworkClass) -> TranscodeProfile {
        let (width, height) = fit_output_dimensions(
            source.0,
            source.1,
            self.config.max_width,
            self.config.max_height,
        );
        let (fps, bitrate_kbps) = if network.is_slow() {
            (self.config.slow_fps, self.config.slow_bitrate_kbps)
        } else {
            (self.config.normal_fps, self.config.normal_bitrate_kbps)
        };
        TranscodeProfile {
            width,
            height,
            fps,
            bitrate_kbps,
        }
    }

    /// Re-encode `media` under the profile for `network`.
    ///
    /// Returns `None` when the backend fails or its output is not
    /// smaller than the input; the caller then uploads the original.
    /// The compressed copy carries no preview handle.
    pub async fn compress(
        &self,
        media: &RecordedMedia,
        network: &NetworkClass,
    ) -> Option<RecordedMedia> {
        let profile = self.profile_for((media.width, media.height), network);
        debug!(
            width = profile.width,
            height = profile.height,
            fps = profile.fps,
            bitrate_kbps = profile.bitrate_kbps,
            source_bytes = media.size_bytes(),
            "compressing clip"
        );

        match self.backend.render(media, profile).await {
            Ok(bytes) if (bytes.len() as u64) <= media.size_bytes() => {
                info!(
                    input_bytes = media.size_bytes(),
                    output_bytes = bytes.len(),
                    "compression complete"
                );
                Some(RecordedMedia {
                    bytes,
                    mime_type: media.mime_type.clone(),
                    duration_seconds: media.duration_seconds,
                    width: profile.width,
                    height: profile.height,
                    preview: None,
                })
            }
            Ok(bytes) => {
                warn!(
                    input_bytes = media.size_bytes(),
                    output_bytes = bytes.len(),
                    "compressed output grew, uploading the original"
                );
                None
            }
            Err(e) => {
                warn!("compression failed: {e:#}, uploading the original");
                None
            }
        }
    }
}
