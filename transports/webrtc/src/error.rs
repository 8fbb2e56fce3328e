//! Error types for call negotiation

use crate::description::DescriptionOp;
use crate::peer::EndpointId;
use crate::signaling::MessageKind;

/// Result type alias using negotiation Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or running a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local media could not be acquired (call initiation stays disabled)
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// An offer or answer was rejected by an endpoint's transport
    #[error("Failed to {operation} on {endpoint} endpoint: {reason}")]
    DescriptionSet {
        /// Endpoint whose transport rejected the description
        endpoint: EndpointId,
        /// Step that failed
        operation: DescriptionOp,
        /// Transport-provided reason
        reason: String,
    },

    /// A remote candidate could not be applied (best-effort, never fatal)
    #[error("Failed to apply ICE candidate #{sequence} on {endpoint} endpoint: {reason}")]
    CandidateApply {
        /// Endpoint whose transport rejected the candidate
        endpoint: EndpointId,
        /// Generation sequence of the candidate on its owning endpoint
        sequence: u64,
        /// Transport-provided reason
        reason: String,
    },

    /// The signaling channel failed to deliver a message
    #[error("Failed to deliver {kind} to {target} endpoint: {reason}")]
    SignalingDelivery {
        /// Intended recipient
        target: EndpointId,
        /// Kind of the undelivered message
        kind: MessageKind,
        /// Channel-provided reason
        reason: String,
    },

    /// A negotiation round is already in flight for this endpoint pair
    #[error("Negotiation already in progress: {0}")]
    NegotiationInProgress(String),

    /// Operation not permitted in the endpoint's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The answer was not applied within the configured bound
    #[error("Negotiation timeout: {0}")]
    NegotiationTimeout(String),

    /// A hangup overtook an in-flight negotiation round
    #[error("Negotiation round cancelled: {0}")]
    RoundCancelled(String),

    /// SDP parsing or conversion error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),
}

impl Error {
    /// Wrap a transport failure on a description step
    pub fn description_set(
        endpoint: EndpointId,
        operation: DescriptionOp,
        cause: impl std::fmt::Display,
    ) -> Self {
        Error::DescriptionSet {
            endpoint,
            operation,
            reason: cause.to_string(),
        }
    }

    /// Check if this error aborts the current negotiation round
    pub fn is_round_fatal(&self) -> bool {
        match self {
            Error::DescriptionSet { .. } | Error::NegotiationTimeout(_) => true,
            Error::SignalingDelivery { kind, .. } => kind.is_description(),
            _ => false,
        }
    }

    /// Check if this error is recovered locally while the call continues
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::CandidateApply { .. } => true,
            Error::SignalingDelivery { kind, .. } => *kind == MessageKind::Candidate,
            _ => false,
        }
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
