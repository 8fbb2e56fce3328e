//! Local media acquisition

use super::{LocalMedia, MediaKind, MediaTrackInfo};
use crate::config::MediaConstraints;
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// Capture subsystem collaborator
///
/// Acquires local media according to the requested constraints. Capture
/// itself (cameras, microphones) lives behind this boundary.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire local media, failing with [`Error::MediaAcquisition`] when
    /// the requested kinds are unavailable
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia>;
}

/// Media source producing labelled placeholder tracks
///
/// Used by the loopback binary and tests: it never opens a device, it only
/// announces which tracks would be sent.
#[derive(Debug, Clone)]
pub struct SyntheticMediaSource {
    video_label: Option<String>,
    audio_label: Option<String>,
}

impl SyntheticMediaSource {
    /// Source offering one synthetic camera and one synthetic microphone
    pub fn new() -> Self {
        Self {
            video_label: Some("Synthetic camera".to_string()),
            audio_label: Some("Synthetic microphone".to_string()),
        }
    }

    /// Override the available video device (None: no camera present)
    pub fn with_video_device(mut self, label: Option<&str>) -> Self {
        self.video_label = label.map(str::to_string);
        self
    }

    /// Override the available audio device (None: no microphone present)
    pub fn with_audio_device(mut self, label: Option<&str>) -> Self {
        self.audio_label = label.map(str::to_string);
        self
    }

    fn track(stream_id: &str, kind: MediaKind, label: &str) -> MediaTrackInfo {
        MediaTrackInfo {
            id: format!("{}-{}", kind, stream_id),
            kind,
            label: label.to_string(),
        }
    }
}

impl Default for SyntheticMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia> {
        let stream_id = uuid::Uuid::new_v4().to_string();
        let mut tracks = Vec::new();

        if constraints.video {
            let label = self.video_label.as_deref().ok_or_else(|| {
                Error::MediaAcquisition("Requested video but no camera is available".to_string())
            })?;
            tracks.push(Self::track(&stream_id, MediaKind::Video, label));
        }

        if constraints.audio {
            let label = self.audio_label.as_deref().ok_or_else(|| {
                Error::MediaAcquisition(
                    "Requested audio but no microphone is available".to_string(),
                )
            })?;
            tracks.push(Self::track(&stream_id, MediaKind::Audio, label));
        }

        if tracks.is_empty() {
            return Err(Error::MediaAcquisition(
                "No media kinds requested".to_string(),
            ));
        }

        debug!("Synthetic media acquired with {} track(s)", tracks.len());
        info!("Received local stream {}", stream_id);

        Ok(LocalMedia::new(stream_id, tracks))
    }
}
