//! Peer transport boundary
//!
//! The negotiation layer drives each endpoint's transport through
//! [`PeerTransport`]. Two implementations exist: [`rtc::RtcPeerTransport`]
//! over webrtc-rs, and the scripted double used by the integration tests.

pub mod rtc;

use crate::config::OfferOptions;
use crate::description::SessionDescription;
use crate::media::{LocalMedia, RemoteMedia};
use crate::peer::{CandidateInit, EndpointId, IceCandidate};
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use rtc::{RtcPeerTransport, RtcTransportFactory};

/// Connectivity state reported by the transport itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events a transport emits on its own schedule
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A local candidate was discovered
    LocalCandidate(CandidateInit),
    /// Transport connectivity changed
    StateChanged(TransportState),
    /// A remote track started arriving
    RemoteMedia(RemoteMedia),
}

/// Capabilities the coordinator needs from one endpoint's transport
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach the local media so it is offered/answered
    async fn add_local_media(&self, media: &LocalMedia) -> Result<()>;

    async fn create_offer(&self, options: &OfferOptions) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Release the transport; called at most once per endpoint
    async fn close(&self) -> Result<()>;
}

/// A freshly created transport and its event stream
pub struct TransportHandle {
    pub transport: Arc<dyn PeerTransport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Creates one transport per endpoint when a call starts
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, endpoint: EndpointId) -> Result<TransportHandle>;
}
