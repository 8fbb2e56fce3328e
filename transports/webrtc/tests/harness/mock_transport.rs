//! Scripted `PeerTransport` double
//!
//! Records every call, fails chosen operations, and can hold an operation
//! suspended until the test releases it.

use async_trait::async_trait;
use parking_lot::Mutex;
use peercall_webrtc::config::OfferOptions;
use peercall_webrtc::media::{LocalMedia, RemoteMedia};
use peercall_webrtc::transport::{
    PeerTransport, TransportEvent, TransportFactory, TransportHandle, TransportState,
};
use peercall_webrtc::{CandidateInit, EndpointId, Error, IceCandidate, Result, SessionDescription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use super::{SDP_A, SDP_B};

/// Operations a test can fail or hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    AddLocalMedia,
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
    Close,
}

/// One recorded invocation
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    AddLocalMedia(String),
    CreateOffer,
    CreateAnswer,
    SetLocalDescription(SessionDescription),
    SetRemoteDescription(SessionDescription),
    AddIceCandidate(IceCandidate),
    Close,
}

impl TransportCall {
    pub fn op(&self) -> Op {
        match self {
            TransportCall::AddLocalMedia(_) => Op::AddLocalMedia,
            TransportCall::CreateOffer => Op::CreateOffer,
            TransportCall::CreateAnswer => Op::CreateAnswer,
            TransportCall::SetLocalDescription(_) => Op::SetLocalDescription,
            TransportCall::SetRemoteDescription(_) => Op::SetRemoteDescription,
            TransportCall::AddIceCandidate(_) => Op::AddIceCandidate,
            TransportCall::Close => Op::Close,
        }
    }
}

/// Held operation; each `release` lets one pending invocation through
#[derive(Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn release(&self) {
        self.0.add_permits(1);
    }
}

pub struct MockTransport {
    endpoint: EndpointId,
    sdp: String,
    calls: Mutex<Vec<TransportCall>>,
    failures: Mutex<HashMap<Op, String>>,
    gates: Mutex<HashMap<Op, Gate>>,
    gathered: Mutex<Vec<CandidateInit>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    /// Transport producing `sdp` from create offer/answer
    pub fn new(
        endpoint: EndpointId,
        sdp: &str,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            endpoint,
            sdp: sdp.to_string(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            gathered: Mutex::new(Vec::new()),
            events,
        });
        (transport, rx)
    }

    /// Transport with the default SDP for its endpoint
    pub fn for_endpoint(endpoint: EndpointId) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let sdp = match endpoint {
            EndpointId::Local => SDP_A,
            EndpointId::Remote => SDP_B,
        };
        Self::new(endpoint, sdp)
    }

    pub fn handle(self: &Arc<Self>, events: mpsc::UnboundedReceiver<TransportEvent>) -> TransportHandle {
        TransportHandle {
            transport: Arc::clone(self) as Arc<dyn PeerTransport>,
            events,
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Make `op` fail with `reason`
    pub fn fail(&self, op: Op, reason: &str) {
        self.failures.lock().insert(op, reason.to_string());
    }

    /// Suspend `op` until the returned gate is released
    pub fn hold(&self, op: Op) -> Gate {
        let gate = Gate(Arc::new(Semaphore::new(0)));
        self.gates.lock().insert(op, gate.clone());
        gate
    }

    /// Candidates emitted right after a successful set local description
    pub fn gather_on_set_local(&self, candidates: Vec<CandidateInit>) {
        *self.gathered.lock() = candidates;
    }

    pub fn emit_candidate(&self, init: CandidateInit) {
        let _ = self.events.send(TransportEvent::LocalCandidate(init));
    }

    pub fn emit_state(&self, state: TransportState) {
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    pub fn emit_remote_media(&self, media: RemoteMedia) {
        let _ = self.events.send(TransportEvent::RemoteMedia(media));
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls.lock().iter().map(TransportCall::op).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().iter().filter(|call| call.op() == op).count()
    }

    pub fn was_called(&self, op: Op) -> bool {
        self.count(op) > 0
    }

    /// Candidates handed to `add_ice_candidate`, in call order
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::AddIceCandidate(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call of `op`
    pub fn position(&self, op: Op) -> Option<usize> {
        self.calls.lock().iter().position(|call| call.op() == op)
    }

    async fn enter(&self, call: TransportCall) -> Result<()> {
        let op = call.op();
        self.calls.lock().push(call);

        let gate = self.gates.lock().get(&op).cloned();
        if let Some(Gate(semaphore)) = gate {
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }

        let failure = self.failures.lock().get(&op).cloned();
        match failure {
            Some(reason) if op == Op::AddIceCandidate => Err(Error::IceCandidateError(reason)),
            Some(reason) if op == Op::AddLocalMedia => Err(Error::MediaTrackError(reason)),
            Some(reason) => Err(Error::SdpError(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<()> {
        self.enter(TransportCall::AddLocalMedia(media.stream_id().to_string()))
            .await
    }

    async fn create_offer(&self, _options: &OfferOptions) -> Result<SessionDescription> {
        self.enter(TransportCall::CreateOffer).await?;
        Ok(SessionDescription::offer(self.sdp.clone()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.enter(TransportCall::CreateAnswer).await?;
        Ok(SessionDescription::answer(self.sdp.clone()))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        self.enter(TransportCall::SetLocalDescription(description.clone()))
            .await?;
        let gathered = std::mem::take(&mut *self.gathered.lock());
        for init in gathered {
            self.emit_candidate(init);
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        self.enter(TransportCall::SetRemoteDescription(description.clone()))
            .await
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.enter(TransportCall::AddIceCandidate(candidate.clone()))
            .await
    }

    async fn close(&self) -> Result<()> {
        self.enter(TransportCall::Close).await
    }
}

/// Factory handing out a fresh `MockTransport` per endpoint per call
#[derive(Default)]
pub struct MockTransportFactory {
    failures: Mutex<Vec<(EndpointId, Op, String)>>,
    refused: Mutex<Vec<EndpointId>>,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail `op` on every transport created for `endpoint` from now on
    pub fn fail_on(&self, endpoint: EndpointId, op: Op, reason: &str) {
        self.failures.lock().push((endpoint, op, reason.to_string()));
    }

    /// Refuse to create transports for `endpoint` from now on
    pub fn refuse(&self, endpoint: EndpointId) {
        self.refused.lock().push(endpoint);
    }

    /// Most recently created transport for `endpoint`
    pub fn latest(&self, endpoint: EndpointId) -> Option<Arc<MockTransport>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|transport| transport.endpoint() == endpoint)
            .cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(&self, endpoint: EndpointId) -> Result<TransportHandle> {
        if self.refused.lock().contains(&endpoint) {
            return Err(Error::PeerConnectionError(format!(
                "no transport for {} endpoint",
                endpoint
            )));
        }
        let (transport, events) = MockTransport::for_endpoint(endpoint);
        for (target, op, reason) in self.failures.lock().iter() {
            if *target == endpoint {
                transport.fail(*op, reason);
            }
        }
        self.created.lock().push(Arc::clone(&transport));
        Ok(transport.handle(events))
    }
}
