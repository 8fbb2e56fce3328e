//! Offer/answer negotiation for two-party WebRTC calls
//!
//! This crate sequences the description exchange between a local and a
//! remote endpoint, trickles ICE candidates between them, and tracks each
//! endpoint's connection state.
//!
//! # Features
//!
//! - **Negotiation coordinator**: one offer/answer round per endpoint pair,
//!   bounded by a timeout, cancellable by hangup at any point
//! - **Trickle ICE**: remote candidates are buffered until the receiving
//!   endpoint accepts its remote description, then flushed in order
//! - **Pluggable boundaries**: peer transport, signaling channel and media
//!   source are traits; webrtc-rs and in-process loopback implementations
//!   are provided
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  CallClient (start / call / hangup)                  │
//! │  ├─ MediaSource            -> LocalMedia             │
//! │  └─ NegotiationCoordinator                           │
//! │      ├─ Endpoint local   (state, candidate buffer)   │
//! │      │   └─ PeerTransport (RtcPeerTransport)         │
//! │      ├─ Endpoint remote  (state, candidate buffer)   │
//! │      │   └─ PeerTransport (RtcPeerTransport)         │
//! │      └─ SignalingChannel (LoopbackChannel)           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use peercall_webrtc::CallConfig;
//!
//! let config = CallConfig {
//!     stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
//!     negotiation_timeout_ms: 5_000,
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use peercall_webrtc::{CallClient, CallConfig};
//!
//! # async fn example() -> peercall_webrtc::Result<()> {
//! let client = CallClient::loopback(CallConfig::default())?;
//!
//! client.start().await?;
//! client.call().await?;
//! client.hangup().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod description;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod peer;
pub mod signaling;
pub mod transport;

pub use client::CallClient;
pub use config::{CallConfig, MediaConstraints, OfferOptions, TurnServerConfig};
pub use description::{DescriptionOp, SdpType, SessionDescription};
pub use error::{Error, Result};
pub use media::{LocalMedia, MediaKind, MediaSource, RemoteMedia, SyntheticMediaSource};
pub use negotiation::{CallEvent, NegotiationCoordinator};
pub use peer::{
    CandidateDisposition, CandidateInit, ConnectionState, Endpoint, EndpointId, IceCandidate,
};
pub use signaling::{LoopbackChannel, SignalingChannel, SignalingHandler, SignalingMessage};
pub use transport::{PeerTransport, TransportEvent, TransportFactory, TransportHandle, TransportState};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
