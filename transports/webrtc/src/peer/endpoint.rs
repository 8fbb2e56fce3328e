//! One side of a two-party call

use super::candidate_buffer::{BufferDecision, CandidateBuffer};
use super::state::{ConnectionState, StateEvent};
use super::{CandidateInit, IceCandidate};
use crate::media::LocalMedia;
use crate::transport::{PeerTransport, TransportEvent, TransportFactory, TransportHandle, TransportState};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Identity of an endpoint within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointId {
    /// The caller
    Local,
    /// The callee
    Remote,
}

impl EndpointId {
    /// The other endpoint of the pair
    pub fn peer(self) -> EndpointId {
        match self {
            EndpointId::Local => EndpointId::Remote,
            EndpointId::Remote => EndpointId::Local,
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointId::Local => write!(f, "local"),
            EndpointId::Remote => write!(f, "remote"),
        }
    }
}

/// A state change applied to an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub endpoint: EndpointId,
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Outcome of handing a remote candidate to an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// Held until the remote description is accepted
    Buffered,
    /// Applied to the transport immediately
    Applied,
    /// Identical candidate seen before; ignored
    Duplicate,
    /// Endpoint is closed or failed; ignored
    Dropped,
}

struct EndpointInner {
    state: ConnectionState,
    buffer: CandidateBuffer,
    seen: HashSet<IceCandidate>,
    next_sequence: u64,
    local_media: Option<LocalMedia>,
    transport_state: TransportState,
    remote_description_claimed: bool,
    released: bool,
}

/// Endpoint: one transport, one state machine, one candidate buffer
///
/// State lives behind a synchronous lock that is never held across an
/// `.await`; transport calls run unlocked and re-check the state when they
/// complete, so a hangup is never blocked by a suspended transport step.
/// Candidate application is serialized through `apply_lane` to keep
/// generation order end to end.
pub struct Endpoint {
    id: EndpointId,
    transport: Arc<dyn PeerTransport>,
    inner: Mutex<EndpointInner>,
    apply_lane: tokio::sync::Mutex<()>,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl Endpoint {
    /// Create an endpoint around an already created transport
    pub fn new(id: EndpointId, handle: TransportHandle) -> Self {
        Self {
            id,
            transport: handle.transport,
            inner: Mutex::new(EndpointInner {
                state: ConnectionState::New,
                buffer: CandidateBuffer::new(),
                seen: HashSet::new(),
                next_sequence: 0,
                local_media: None,
                transport_state: TransportState::New,
                remote_description_claimed: false,
                released: false,
            }),
            apply_lane: tokio::sync::Mutex::new(()),
            events: Mutex::new(Some(handle.events)),
        }
    }

    /// Create the endpoint's transport and wrap it
    pub async fn open(id: EndpointId, factory: &dyn TransportFactory) -> Result<Arc<Self>> {
        let handle = factory.create(id).await?;
        info!("Created {} endpoint", id);
        Ok(Arc::new(Self::new(id, handle)))
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn transport_state(&self) -> TransportState {
        self.inner.lock().transport_state
    }

    pub fn has_local_media(&self) -> bool {
        self.inner.lock().local_media.is_some()
    }

    pub fn local_media(&self) -> Option<LocalMedia> {
        self.inner.lock().local_media.clone()
    }

    /// Candidates currently held back, oldest first
    pub fn buffered_candidates(&self) -> Vec<IceCandidate> {
        self.inner.lock().buffer.pending()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    /// Hand the local media to the transport; only allowed before negotiation
    pub async fn attach_local_media(&self, media: &LocalMedia) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::New {
            return Err(Error::InvalidState(format!(
                "cannot attach local media to {} endpoint in state {}",
                self.id, state
            )));
        }

        self.transport.add_local_media(media).await?;
        self.inner.lock().local_media = Some(media.clone());

        info!(
            "Added local stream {} to {} endpoint",
            media.stream_id(),
            self.id
        );
        Ok(())
    }

    /// Reserve this endpoint's one remote description step
    ///
    /// Succeeds at most once per endpoint and only while it is in `expected`.
    /// A redelivered offer or answer loses the claim and is ignored.
    pub(crate) fn claim_remote_description(&self, expected: ConnectionState) -> bool {
        let mut inner = self.inner.lock();
        if inner.remote_description_claimed || inner.state != expected {
            return false;
        }
        inner.remote_description_claimed = true;
        true
    }

    /// Take the transport event stream (once)
    pub(crate) fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.lock().take()
    }

    /// Apply a negotiation event
    ///
    /// Returns `Ok(None)` when the endpoint is already terminal: a step that
    /// completes after hangup or failure has no effect.
    pub(crate) fn apply(&self, event: StateEvent) -> Result<Option<Transition>> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            debug!(
                "Ignoring {:?} on {} endpoint in terminal state {}",
                event, self.id, inner.state
            );
            return Ok(None);
        }

        let from = inner.state;
        let to = from.next(event)?;
        inner.state = to;

        debug!("Endpoint {} state transition: {} -> {}", self.id, from, to);
        Ok(Some(Transition {
            endpoint: self.id,
            from,
            to,
        }))
    }

    /// Stamp a locally discovered candidate with owner and generation order
    pub(crate) fn stamp_candidate(&self, init: CandidateInit) -> Option<IceCandidate> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return None;
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        Some(IceCandidate::new(self.id, sequence, init))
    }

    pub(crate) fn record_transport_state(&self, state: TransportState) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.transport_state != state;
        inner.transport_state = state;
        changed
    }

    /// Accept a candidate discovered by the peer
    ///
    /// Buffers until this endpoint's remote description has been accepted,
    /// applies immediately afterwards, and ignores duplicates and anything
    /// arriving once the endpoint is terminal.
    pub async fn receive_candidate(&self, candidate: IceCandidate) -> Result<CandidateDisposition> {
        if candidate.owner == self.id {
            return Err(Error::InvalidState(format!(
                "{} endpoint cannot receive its own candidate #{}",
                self.id, candidate.sequence
            )));
        }

        let decision = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                debug!(
                    "Dropping candidate #{} for {} endpoint in state {}",
                    candidate.sequence, self.id, inner.state
                );
                return Ok(CandidateDisposition::Dropped);
            }
            if !inner.seen.insert(candidate.clone()) {
                debug!(
                    "Ignoring duplicate candidate #{} from {}",
                    candidate.sequence, candidate.owner
                );
                return Ok(CandidateDisposition::Duplicate);
            }
            inner.buffer.enqueue(candidate)
        };

        match decision {
            BufferDecision::Buffered => Ok(CandidateDisposition::Buffered),
            BufferDecision::Dropped => Ok(CandidateDisposition::Dropped),
            BufferDecision::ApplyNow(candidate) => {
                let _lane = self.apply_lane.lock().await;
                if self.apply_candidate(&candidate).await? {
                    Ok(CandidateDisposition::Applied)
                } else {
                    Ok(CandidateDisposition::Dropped)
                }
            }
        }
    }

    /// Drain the candidate buffer into the transport
    ///
    /// Called once the remote description has been accepted. Apply failures
    /// are logged and do not stop the remaining candidates.
    pub(crate) async fn flush_candidates(&self) -> usize {
        let _lane = self.apply_lane.lock().await;
        let drained = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return 0;
            }
            inner.buffer.take_for_flush()
        };

        if !drained.is_empty() {
            debug!(
                "Flushing {} buffered candidate(s) on {} endpoint",
                drained.len(),
                self.id
            );
        }

        let mut applied = 0;
        for candidate in &drained {
            match self.apply_candidate(candidate).await {
                Ok(true) => applied += 1,
                Ok(false) => break,
                Err(e) => warn!("{}", e),
            }
        }
        applied
    }

    async fn apply_candidate(&self, candidate: &IceCandidate) -> Result<bool> {
        if self.is_terminal() {
            debug!(
                "Skipping candidate #{} on {} endpoint: endpoint is terminal",
                candidate.sequence, self.id
            );
            return Ok(false);
        }

        self.transport
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| Error::CandidateApply {
                endpoint: self.id,
                sequence: candidate.sequence,
                reason: e.to_string(),
            })?;

        debug!(
            "Applied candidate #{} from {} on {} endpoint: {}",
            candidate.sequence,
            candidate.owner,
            self.id,
            candidate.candidate()
        );
        Ok(true)
    }

    /// Move to Failed, discard buffered candidates and release the transport
    pub(crate) async fn fail(&self) -> Option<Transition> {
        let (transition, release) = self.terminate(StateEvent::Failure);
        if let Some(transition) = transition {
            warn!(
                "Endpoint {} failed in state {}",
                self.id, transition.from
            );
        }
        if release {
            self.release_transport().await;
        }
        transition
    }

    /// Move to Closed, discard buffered candidates and release the transport
    ///
    /// Idempotent: closing a closed endpoint does nothing. A failed endpoint
    /// keeps its Failed state but is released if it was not already.
    pub async fn close(&self) -> Option<Transition> {
        let (transition, release) = self.terminate(StateEvent::Close);
        if release {
            self.release_transport().await;
        }
        transition
    }

    fn terminate(&self, event: StateEvent) -> (Option<Transition>, bool) {
        let mut inner = self.inner.lock();
        let from = inner.state;
        let transition = from.next(event).ok().map(|to| {
            inner.state = to;
            debug!("Endpoint {} state transition: {} -> {}", self.id, from, to);
            Transition {
                endpoint: self.id,
                from,
                to,
            }
        });

        let dropped = inner.buffer.discard();
        if dropped > 0 {
            debug!(
                "Discarded {} buffered candidate(s) on {} endpoint",
                dropped, self.id
            );
        }
        inner.seen.clear();

        let release = !inner.released;
        inner.released = true;
        (transition, release)
    }

    async fn release_transport(&self) {
        info!("Closing {} endpoint transport", self.id);
        if let Err(e) = self.transport.close().await {
            warn!("Error closing {} endpoint transport: {}", self.id, e);
        }
    }
}

/// Move both endpoints to Connected together
///
/// Returns `Ok(None)` if either endpoint became terminal in the meantime, in
/// which case neither is changed.
pub(crate) fn complete_pair(
    offerer: &Endpoint,
    answerer: &Endpoint,
) -> Result<Option<[Transition; 2]>> {
    let mut offerer_inner = offerer.inner.lock();
    let mut answerer_inner = answerer.inner.lock();

    if offerer_inner.state.is_terminal() || answerer_inner.state.is_terminal() {
        return Ok(None);
    }

    let offerer_from = offerer_inner.state;
    let answerer_from = answerer_inner.state;
    let offerer_to = offerer_from.next(StateEvent::RemoteAnswerApplied)?;
    let answerer_to = answerer_from.next(StateEvent::AnswerAcceptedByPeer)?;

    offerer_inner.state = offerer_to;
    answerer_inner.state = answerer_to;

    debug!(
        "Endpoints {} and {} reached {}",
        offerer.id, answerer.id, offerer_to
    );

    Ok(Some([
        Transition {
            endpoint: offerer.id,
            from: offerer_from,
            to: offerer_to,
        },
        Transition {
            endpoint: answerer.id,
            from: answerer_from,
            to: answerer_to,
        },
    ]))
}
