//! Signaling channel abstraction

use super::SignalingMessage;
use crate::peer::EndpointId;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives messages addressed to an endpoint
#[async_trait]
pub trait SignalingHandler: Send + Sync {
    async fn on_message(&self, target: EndpointId, message: SignalingMessage);
}

/// Transport for signaling messages between the two endpoints
///
/// Implementations must deliver messages for a given target in the order
/// they were sent. No ordering is promised across targets.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Queue `message` for delivery to `target`
    ///
    /// Fails with [`crate::Error::SignalingDelivery`] if the channel can no
    /// longer deliver.
    async fn send(&self, target: EndpointId, message: SignalingMessage) -> Result<()>;

    /// Install the handler that inbound messages are dispatched to
    ///
    /// Must be called from within a Tokio runtime.
    fn register_handler(&self, handler: Arc<dyn SignalingHandler>);
}
