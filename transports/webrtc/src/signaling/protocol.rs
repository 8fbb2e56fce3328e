//! Signaling message types and their JSON wire form

use crate::description::SessionDescription;
use crate::peer::{EndpointId, IceCandidate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message relayed between the two endpoints of a call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "params", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Session offer from the caller
    Offer(SessionDescription),

    /// Session answer from the callee
    Answer(SessionDescription),

    /// Trickled ICE candidate
    Candidate(IceCandidate),

    /// The sender has ended the call
    Hangup,
}

/// Discriminant of a [`SignalingMessage`], used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Offer,
    Answer,
    Candidate,
    Hangup,
}

impl MessageKind {
    /// Offer and answer carry session descriptions; losing one ends the round
    pub fn is_description(self) -> bool {
        matches!(self, MessageKind::Offer | MessageKind::Answer)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
            MessageKind::Hangup => "hangup",
        };
        f.write_str(name)
    }
}

impl SignalingMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalingMessage::Offer(_) => MessageKind::Offer,
            SignalingMessage::Answer(_) => MessageKind::Answer,
            SignalingMessage::Candidate(_) => MessageKind::Candidate,
            SignalingMessage::Hangup => MessageKind::Hangup,
        }
    }

    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize signaling message: {}",
                e
            ))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to deserialize signaling message: {}",
                e
            ))
        })
    }
}

/// A message addressed to one endpoint, as it travels over a channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingEnvelope {
    /// Recipient endpoint
    pub to: EndpointId,

    /// Payload
    pub message: SignalingMessage,
}

impl SignalingEnvelope {
    pub fn new(to: EndpointId, message: SignalingMessage) -> Self {
        Self { to, message }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize signaling envelope: {}",
                e
            ))
        })
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to deserialize signaling envelope: {}",
                e
            ))
        })
    }
}
