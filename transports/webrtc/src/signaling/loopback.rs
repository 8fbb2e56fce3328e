//! In-process signaling channel for a call between two local endpoints
//!
//! Every message is serialized to its JSON wire form and decoded again on
//! the receiving side, so the loopback path exercises the same envelope a
//! networked relay would carry.

use super::{MessageKind, SignalingChannel, SignalingEnvelope, SignalingHandler, SignalingMessage};
use crate::peer::EndpointId;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-target FIFO queues with one dispatcher task per target
pub struct LoopbackChannel {
    senders: HashMap<EndpointId, mpsc::UnboundedSender<String>>,
    receivers: Mutex<HashMap<EndpointId, mpsc::UnboundedReceiver<String>>>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for target in [EndpointId::Local, EndpointId::Remote] {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(target, tx);
            receivers.insert(target, rx);
        }

        Self {
            senders,
            receivers: Mutex::new(receivers),
            dispatchers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop delivering; later sends fail
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for dispatcher in self.dispatchers.lock().drain(..) {
            dispatcher.abort();
        }
        debug!("Loopback signaling channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn delivery_error(target: EndpointId, kind: MessageKind, reason: &str) -> Error {
        Error::SignalingDelivery {
            target,
            kind,
            reason: reason.to_string(),
        }
    }
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        for dispatcher in self.dispatchers.lock().drain(..) {
            dispatcher.abort();
        }
    }
}

#[async_trait]
impl SignalingChannel for LoopbackChannel {
    async fn send(&self, target: EndpointId, message: SignalingMessage) -> Result<()> {
        let kind = message.kind();
        if self.is_closed() {
            return Err(Self::delivery_error(target, kind, "channel closed"));
        }

        let frame = SignalingEnvelope::new(target, message).to_json()?;
        let sender = self
            .senders
            .get(&target)
            .ok_or_else(|| Self::delivery_error(target, kind, "unknown target"))?;

        sender
            .send(frame)
            .map_err(|_| Self::delivery_error(target, kind, "receiver dropped"))?;

        debug!("Queued {} for {} endpoint", kind, target);
        Ok(())
    }

    fn register_handler(&self, handler: Arc<dyn SignalingHandler>) {
        let receivers: Vec<_> = self.receivers.lock().drain().collect();
        if receivers.is_empty() {
            warn!("Loopback signaling channel already has a handler; ignoring");
            return;
        }

        let mut dispatchers = self.dispatchers.lock();
        for (target, mut rx) in receivers {
            let handler = Arc::clone(&handler);
            dispatchers.push(tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    match SignalingEnvelope::from_json(&frame) {
                        Ok(envelope) if envelope.to == target => {
                            handler.on_message(envelope.to, envelope.message).await;
                        }
                        Ok(envelope) => {
                            warn!(
                                "Dropping {} addressed to {} from the {} queue",
                                envelope.message.kind(),
                                envelope.to,
                                target
                            );
                        }
                        Err(e) => warn!("Dropping undecodable signaling frame: {}", e),
                    }
                }
                debug!("Dispatcher for {} endpoint finished", target);
            }));
        }
    }
}
