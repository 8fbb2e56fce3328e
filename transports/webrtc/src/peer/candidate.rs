//! ICE candidates as seen by the negotiation layer

use super::EndpointId;
use serde::{Deserialize, Serialize};

/// Candidate as emitted by a transport, before it is stamped with an owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateInit {
    /// Candidate attribute (`candidate:...`), opaque to negotiation
    pub candidate: String,

    /// Media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Media line index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

impl CandidateInit {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// A locally discovered candidate on its way to the peer
///
/// `sequence` is the generation order on the owning endpoint; it is what
/// buffering and de-duplication key on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Endpoint whose transport discovered the candidate
    pub owner: EndpointId,

    /// Generation order on the owner, starting at 0
    pub sequence: u64,

    /// Candidate payload
    #[serde(flatten)]
    pub init: CandidateInit,
}

impl IceCandidate {
    pub fn new(owner: EndpointId, sequence: u64, init: CandidateInit) -> Self {
        Self {
            owner,
            sequence,
            init,
        }
    }

    pub fn candidate(&self) -> &str {
        &self.init.candidate
    }
}
