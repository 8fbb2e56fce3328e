//! Session descriptions exchanged during offer/answer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the offer/answer exchange a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Proposal produced by the offerer
    Offer,
    /// Response produced by the answerer
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// An immutable offer or answer
///
/// The payload is opaque to the negotiation layer; only the transport that
/// produced it (and the peer transport consuming it) interprets the SDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    kind: SdpType,
    sdp: String,
}

impl SessionDescription {
    /// Create an offer from an SDP blob
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer from an SDP blob
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn kind(&self) -> SdpType {
        self.kind
    }

    pub fn sdp(&self) -> &str {
        &self.sdp
    }
}

/// A transport step in the description exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptionOp {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
}

impl fmt::Display for DescriptionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DescriptionOp::CreateOffer => "create offer",
            DescriptionOp::CreateAnswer => "create answer",
            DescriptionOp::SetLocalDescription => "set local description",
            DescriptionOp::SetRemoteDescription => "set remote description",
        };
        f.write_str(name)
    }
}
