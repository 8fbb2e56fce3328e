//! Signaling channel that records sends and can drop or redeliver chosen
//! message kinds

use async_trait::async_trait;
use parking_lot::Mutex;
use peercall_webrtc::signaling::{
    LoopbackChannel, MessageKind, SignalingChannel, SignalingHandler, SignalingMessage,
};
use peercall_webrtc::{EndpointId, Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

pub struct RecordingChannel {
    inner: LoopbackChannel,
    sent: Mutex<Vec<(EndpointId, SignalingMessage)>>,
    failing: Mutex<HashSet<MessageKind>>,
    repeated: Mutex<HashSet<MessageKind>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: LoopbackChannel::new(),
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            repeated: Mutex::new(HashSet::new()),
        })
    }

    /// Fail every subsequent send of `kind`
    pub fn fail_kind(&self, kind: MessageKind) {
        self.failing.lock().insert(kind);
    }

    /// Deliver every subsequent send of `kind` twice
    pub fn repeat_kind(&self, kind: MessageKind) {
        self.repeated.lock().insert(kind);
    }

    /// Every attempted send, delivered or not
    pub fn sent(&self) -> Vec<(EndpointId, SignalingMessage)> {
        self.sent.lock().clone()
    }

    pub fn sent_kinds(&self) -> Vec<(EndpointId, MessageKind)> {
        self.sent
            .lock()
            .iter()
            .map(|(target, message)| (*target, message.kind()))
            .collect()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(_, message)| message.kind() == kind)
            .count()
    }
}

#[async_trait]
impl SignalingChannel for RecordingChannel {
    async fn send(&self, target: EndpointId, message: SignalingMessage) -> Result<()> {
        let kind = message.kind();
        self.sent.lock().push((target, message.clone()));

        if self.failing.lock().contains(&kind) {
            return Err(Error::SignalingDelivery {
                target,
                kind,
                reason: "injected delivery failure".to_string(),
            });
        }

        if self.repeated.lock().contains(&kind) {
            self.inner.send(target, message.clone()).await?;
        }
        self.inner.send(target, message).await
    }

    fn register_handler(&self, handler: Arc<dyn SignalingHandler>) {
        self.inner.register_handler(handler);
    }
}
