//! Media boundary types
//!
//! The negotiation layer never touches media samples. It receives an opaque
//! [`LocalMedia`] token once capture is ready and reports [`RemoteMedia`]
//! handles when a peer transport starts receiving a track.

pub mod source;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use source::{MediaSource, SyntheticMediaSource};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Description of one captured track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrackInfo {
    /// Track identifier
    pub id: String,

    /// Audio or video
    pub kind: MediaKind,

    /// Human-readable device label
    pub label: String,
}

/// "Local media ready" token handed to the call once capture succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    stream_id: String,
    tracks: Vec<MediaTrackInfo>,
}

impl LocalMedia {
    pub fn new(stream_id: impl Into<String>, tracks: Vec<MediaTrackInfo>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn tracks(&self) -> &[MediaTrackInfo] {
        &self.tracks
    }

    /// First track of the given kind, if any
    pub fn first_track(&self, kind: MediaKind) -> Option<&MediaTrackInfo> {
        self.tracks.iter().find(|track| track.kind == kind)
    }

    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.first_track(kind).is_some()
    }
}

/// Handle for a track an endpoint started receiving from its peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    /// Remote track identifier
    pub track_id: String,

    /// Remote stream the track belongs to
    pub stream_id: String,

    /// Audio or video
    pub kind: MediaKind,
}
