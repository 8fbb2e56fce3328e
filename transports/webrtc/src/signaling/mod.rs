//! Signaling: message types, the channel abstraction and the loopback relay

pub mod channel;
pub mod loopback;
pub mod protocol;

pub use channel::{SignalingChannel, SignalingHandler};
pub use loopback::LoopbackChannel;
pub use protocol::{MessageKind, SignalingEnvelope, SignalingMessage};
