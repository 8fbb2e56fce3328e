//! Per-endpoint negotiation state machine
//!
//! ```text
//! offerer:  New -> HaveLocalOffer -> HaveRemoteAnswerPending -> Connected
//! answerer: New -> HaveRemoteOffer -> HaveLocalAnswer          -> Connected
//!
//! any non-terminal --Failure--> Failed      (absorbing)
//! any non-terminal --Close-->   Closed      (absorbing)
//! ```

use std::fmt;

/// Negotiation/connection lifecycle of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, nothing negotiated yet
    New,
    /// Offer applied as local description
    HaveLocalOffer,
    /// Peer accepted our offer, answer not applied yet
    HaveRemoteAnswerPending,
    /// Peer's offer applied as remote description
    HaveRemoteOffer,
    /// Answer applied as local description
    HaveLocalAnswer,
    /// Offer/answer exchange completed on both sides
    Connected,
    /// Unrecoverable negotiation error
    Failed,
    /// Hung up
    Closed,
}

/// Inputs driving [`ConnectionState`] forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Our offer was set as local description
    LocalOfferApplied,
    /// The peer set our offer as its remote description
    OfferAcceptedByPeer,
    /// The peer's answer was set as our remote description
    RemoteAnswerApplied,
    /// The peer's offer was set as our remote description
    RemoteOfferApplied,
    /// Our answer was set as local description
    LocalAnswerApplied,
    /// The peer set our answer as its remote description
    AnswerAcceptedByPeer,
    /// A description step failed
    Failure,
    /// Hangup
    Close,
}

/// A transition that was rejected by the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub state: ConnectionState,
    pub event: StateEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not accepted in state {}", self.event, self.state)
    }
}

impl From<InvalidTransition> for crate::Error {
    fn from(err: InvalidTransition) -> Self {
        crate::Error::InvalidState(err.to_string())
    }
}

impl ConnectionState {
    /// Apply an event, returning the next state
    pub fn next(self, event: StateEvent) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;
        use StateEvent::*;

        let next = match (self, event) {
            (Closed | Failed, _) => None,
            (_, Failure) => Some(Failed),
            (_, Close) => Some(Closed),

            (New, LocalOfferApplied) => Some(HaveLocalOffer),
            (HaveLocalOffer, OfferAcceptedByPeer) => Some(HaveRemoteAnswerPending),
            (HaveRemoteAnswerPending, RemoteAnswerApplied) => Some(Connected),

            (New, RemoteOfferApplied) => Some(HaveRemoteOffer),
            (HaveRemoteOffer, LocalAnswerApplied) => Some(HaveLocalAnswer),
            (HaveLocalAnswer, AnswerAcceptedByPeer) => Some(Connected),

            _ => None,
        };

        next.ok_or(InvalidTransition { state: self, event })
    }

    /// Closed and Failed accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::HaveLocalOffer => "have-local-offer",
            ConnectionState::HaveRemoteAnswerPending => "have-remote-answer-pending",
            ConnectionState::HaveRemoteOffer => "have-remote-offer",
            ConnectionState::HaveLocalAnswer => "have-local-answer",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
