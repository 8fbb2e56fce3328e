//! Observable call events

use crate::media::RemoteMedia;
use crate::peer::{ConnectionState, EndpointId, Transition};
use crate::transport::TransportState;
use std::time::Duration;

/// Published on the coordinator's broadcast channel
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// An endpoint's negotiation state changed
    StateChanged {
        endpoint: EndpointId,
        from: ConnectionState,
        to: ConnectionState,
    },

    /// An endpoint's transport reported a connectivity change
    TransportStateChanged {
        endpoint: EndpointId,
        state: TransportState,
    },

    /// An endpoint started receiving media from its peer
    RemoteMediaReceived {
        endpoint: EndpointId,
        media: RemoteMedia,
    },

    /// Both endpoints reached Connected
    NegotiationCompleted {
        /// Time from call initiation to the answer being applied
        setup_time: Duration,
    },

    /// The round was aborted by a description-level failure
    NegotiationFailed { reason: String },
}

impl From<Transition> for CallEvent {
    fn from(transition: Transition) -> Self {
        CallEvent::StateChanged {
            endpoint: transition.endpoint,
            from: transition.from,
            to: transition.to,
        }
    }
}
