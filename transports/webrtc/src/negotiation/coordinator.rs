//! Negotiation coordinator
//!
//! Sequences one offer/answer round between two endpoints:
//!
//! ```text
//! local:  create offer -> set local  --Offer-->  remote: set remote -> flush
//!                                                       create answer -> set local
//! local:  set remote -> flush -> Connected  <--Answer--  remote: Connected
//! ```
//!
//! The caller of [`NegotiationCoordinator::initiate_call`] drives the offer
//! side; everything after the offer is sent runs from the signaling
//! handler, and the round's outcome is handed back over a oneshot.

use super::events::CallEvent;
use crate::config::CallConfig;
use crate::description::{DescriptionOp, SdpType, SessionDescription};
use crate::peer::endpoint::complete_pair;
use crate::peer::{
    CandidateDisposition, ConnectionState, Endpoint, EndpointId, IceCandidate, StateEvent,
    Transition,
};
use crate::signaling::{SignalingChannel, SignalingHandler, SignalingMessage};
use crate::transport::{TransportEvent, TransportState};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// The two endpoints of the current call
struct CallPair {
    local: Arc<Endpoint>,
    remote: Arc<Endpoint>,
}

impl CallPair {
    fn get(&self, id: EndpointId) -> Option<&Arc<Endpoint>> {
        [&self.local, &self.remote]
            .into_iter()
            .find(|endpoint| endpoint.id() == id)
    }
}

/// Round awaiting its answer
struct PendingRound {
    outcome: oneshot::Sender<Result<()>>,
    started: Instant,
}

/// Clears the in-flight flag when `initiate_call` returns
struct RoundGuard<'a>(&'a AtomicBool);

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives negotiation between a local and a remote endpoint
pub struct NegotiationCoordinator {
    config: CallConfig,
    channel: Arc<dyn SignalingChannel>,
    pair: RwLock<Option<CallPair>>,
    round: Mutex<Option<PendingRound>>,
    round_active: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<CallEvent>,
}

impl NegotiationCoordinator {
    /// Create a coordinator and register it as the channel's inbound handler
    pub fn new(config: CallConfig, channel: Arc<dyn SignalingChannel>) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let coordinator = Arc::new(Self {
            config,
            channel: Arc::clone(&channel),
            pair: RwLock::new(None),
            round: Mutex::new(None),
            round_active: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            events,
        });

        channel.register_handler(Arc::new(InboundRouter {
            coordinator: Arc::downgrade(&coordinator),
        }));

        coordinator
    }

    /// Subscribe to call events
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Whether an `initiate_call` is currently in flight
    pub fn is_round_active(&self) -> bool {
        self.round_active.load(Ordering::SeqCst)
    }

    /// Run one negotiation round from `local` (offerer) to `remote` (answerer)
    ///
    /// Returns once the answer has been applied on `local` and both endpoints
    /// are Connected, or with the error that aborted the round.
    #[instrument(skip_all, fields(local = %local.id(), remote = %remote.id()))]
    pub async fn initiate_call(
        self: &Arc<Self>,
        local: &Arc<Endpoint>,
        remote: &Arc<Endpoint>,
    ) -> Result<()> {
        if self
            .round_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::NegotiationInProgress(format!(
                "a round between {} and {} is already running",
                local.id(),
                remote.id()
            )));
        }
        let _guard = RoundGuard(&self.round_active);

        if local.id() == remote.id() {
            return Err(Error::InvalidState(format!(
                "cannot negotiate {} endpoint with itself",
                local.id()
            )));
        }
        for endpoint in [local, remote] {
            let state = endpoint.state();
            if state != ConnectionState::New {
                return Err(Error::InvalidState(format!(
                    "{} endpoint must be new to start a call, found {}",
                    endpoint.id(),
                    state
                )));
            }
        }
        if !local.has_local_media() {
            return Err(Error::MediaAcquisition(format!(
                "no local media attached to {} endpoint",
                local.id()
            )));
        }

        let (outcome_tx, outcome_rx) = oneshot::channel();
        *self.round.lock() = Some(PendingRound {
            outcome: outcome_tx,
            started: Instant::now(),
        });
        *self.pair.write() = Some(CallPair {
            local: Arc::clone(local),
            remote: Arc::clone(remote),
        });
        self.spawn_event_pump(local);
        self.spawn_event_pump(remote);

        info!("Starting call: {} -> {}", local.id(), remote.id());

        let timeout = self.config.negotiation_timeout();
        match tokio::time::timeout(timeout, self.offer_and_wait(local, remote, outcome_rx)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.round.lock().take();
                Err(e)
            }
            Err(_) => {
                self.round.lock().take();
                error!("Negotiation timed out after {:?}", timeout);
                self.fail_endpoint(local).await;
                self.fail_endpoint(remote).await;
                let reason = format!("answer not applied within {:?}", timeout);
                self.emit(CallEvent::NegotiationFailed {
                    reason: reason.clone(),
                });
                Err(Error::NegotiationTimeout(reason))
            }
        }
    }

    async fn offer_and_wait(
        &self,
        local: &Arc<Endpoint>,
        remote: &Arc<Endpoint>,
        outcome: oneshot::Receiver<Result<()>>,
    ) -> Result<()> {
        if let Err(e) = self.send_offer(local, remote.id()).await {
            if !matches!(e, Error::RoundCancelled(_)) {
                error!("Negotiation failed: {}", e);
                self.fail_endpoint(local).await;
                self.emit(CallEvent::NegotiationFailed {
                    reason: e.to_string(),
                });
            }
            return Err(e);
        }

        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(Error::RoundCancelled(
                "call ended before the answer was applied".to_string(),
            )),
        }
    }

    async fn send_offer(&self, local: &Endpoint, target: EndpointId) -> Result<()> {
        let transport = local.transport();

        let offer = self
            .step(local, DescriptionOp::CreateOffer, transport.create_offer(&self.config.offer))
            .await?;
        info!("Offer created on {} endpoint", local.id());

        self.step(
            local,
            DescriptionOp::SetLocalDescription,
            transport.set_local_description(&offer),
        )
        .await?;
        self.advance(local, StateEvent::LocalOfferApplied)?;

        debug!("Sending offer to {} endpoint", target);
        self.channel
            .send(target, SignalingMessage::Offer(offer))
            .await
    }

    /// Answer an offer delivered to `answerer`
    async fn accept_offer(&self, answerer: &Endpoint, offer: SessionDescription) -> Result<()> {
        let transport = answerer.transport();

        self.step(
            answerer,
            DescriptionOp::SetRemoteDescription,
            transport.set_remote_description(&offer),
        )
        .await?;
        self.advance(answerer, StateEvent::RemoteOfferApplied)?;
        answerer.flush_candidates().await;

        if let Some(offerer) = self.endpoint(answerer.id().peer()) {
            self.advance(&offerer, StateEvent::OfferAcceptedByPeer)?;
        }

        let answer = self
            .step(answerer, DescriptionOp::CreateAnswer, transport.create_answer())
            .await?;
        info!("Answer created on {} endpoint", answerer.id());

        self.step(
            answerer,
            DescriptionOp::SetLocalDescription,
            transport.set_local_description(&answer),
        )
        .await?;
        self.advance(answerer, StateEvent::LocalAnswerApplied)?;

        let target = answerer.id().peer();
        debug!("Sending answer to {} endpoint", target);
        self.channel
            .send(target, SignalingMessage::Answer(answer))
            .await
    }

    /// Apply an answer delivered to `offerer` and finish the round
    async fn accept_answer(&self, offerer: &Endpoint, answer: SessionDescription) -> Result<()> {
        if offerer.state() == ConnectionState::Connected {
            debug!("{} endpoint already connected, ignoring answer", offerer.id());
            return Ok(());
        }

        self.step(
            offerer,
            DescriptionOp::SetRemoteDescription,
            offerer.transport().set_remote_description(&answer),
        )
        .await?;
        offerer.flush_candidates().await;

        let answerer = self.endpoint(offerer.id().peer()).ok_or_else(|| {
            Error::InvalidState(format!("no peer for {} endpoint", offerer.id()))
        })?;

        match complete_pair(offerer, &answerer)? {
            Some(transitions) => {
                for transition in transitions {
                    self.record(transition);
                }
                self.complete_round(Ok(()));
                Ok(())
            }
            None => Err(Error::RoundCancelled(
                "call ended before both endpoints connected".to_string(),
            )),
        }
    }

    /// Run one transport step on behalf of `endpoint`
    ///
    /// Nothing runs if the endpoint is already terminal, and a step that
    /// completes after the endpoint turned terminal yields `RoundCancelled`.
    async fn step<T>(
        &self,
        endpoint: &Endpoint,
        operation: DescriptionOp,
        action: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        Self::ensure_live(endpoint)?;
        let outcome = action.await;
        Self::ensure_live(endpoint)?;
        outcome.map_err(|e| Error::description_set(endpoint.id(), operation, e))
    }

    fn ensure_live(endpoint: &Endpoint) -> Result<()> {
        let state = endpoint.state();
        if state.is_terminal() {
            return Err(Error::RoundCancelled(format!(
                "{} endpoint is {}",
                endpoint.id(),
                state
            )));
        }
        Ok(())
    }

    fn advance(&self, endpoint: &Endpoint, event: StateEvent) -> Result<()> {
        match endpoint.apply(event)? {
            Some(transition) => {
                self.record(transition);
                Ok(())
            }
            None => Err(Error::RoundCancelled(format!(
                "{} endpoint closed before {:?}",
                endpoint.id(),
                event
            ))),
        }
    }

    fn record(&self, transition: Transition) {
        info!(
            "Endpoint {} state: {} -> {}",
            transition.endpoint, transition.from, transition.to
        );
        self.emit(CallEvent::from(transition));
    }

    fn emit(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn fail_endpoint(&self, endpoint: &Endpoint) {
        if let Some(transition) = endpoint.fail().await {
            self.record(transition);
        }
    }

    fn complete_round(&self, result: Result<()>) {
        let Some(round) = self.round.lock().take() else {
            return;
        };

        match &result {
            Ok(()) => {
                let setup_time = round.started.elapsed();
                info!("Call connected, setup time {:?}", setup_time);
                self.emit(CallEvent::NegotiationCompleted { setup_time });
            }
            Err(e) => self.emit(CallEvent::NegotiationFailed {
                reason: e.to_string(),
            }),
        }

        let _ = round.outcome.send(result);
    }

    /// Abort the round from the answering side
    async fn abort_round(&self, endpoint: &Endpoint, err: Error) {
        if matches!(err, Error::RoundCancelled(_)) {
            debug!("Round cancelled: {}", err);
            return;
        }
        error!("Negotiation failed: {}", err);
        self.fail_endpoint(endpoint).await;
        self.complete_round(Err(err));
    }

    /// Hand a candidate discovered by the peer to `endpoint`
    ///
    /// Buffered until `endpoint` has accepted its remote description, applied
    /// immediately afterwards. Duplicates and candidates for closed endpoints
    /// are no-ops.
    #[instrument(skip_all, fields(endpoint = %endpoint.id(), sequence = candidate.sequence))]
    pub async fn submit_remote_candidate(
        &self,
        endpoint: &Endpoint,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition> {
        let disposition = endpoint.receive_candidate(candidate).await?;
        debug!("Remote candidate {:?}", disposition);
        Ok(disposition)
    }

    /// Close both endpoints and tell the peer
    ///
    /// Always accepted, including while a round is suspended. Idempotent.
    #[instrument(skip_all, fields(local = %local.id(), remote = %remote.id()))]
    pub async fn hangup(&self, local: &Arc<Endpoint>, remote: &Arc<Endpoint>) -> Result<()> {
        if self.round.lock().take().is_some() {
            debug!("Cancelling in-flight negotiation round");
        }

        let (local_closed, remote_closed) =
            futures::future::join(local.close(), remote.close()).await;

        let hung_up = local_closed.is_some();
        for transition in [local_closed, remote_closed].into_iter().flatten() {
            self.record(transition);
        }

        if hung_up {
            if let Err(e) = self
                .channel
                .send(remote.id(), SignalingMessage::Hangup)
                .await
            {
                debug!("Hangup not delivered: {}", e);
            }
            info!("Call ended");
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let mut pair = self.pair.write();
        if pair
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(&p.local, local) && Arc::ptr_eq(&p.remote, remote))
        {
            *pair = None;
        }

        Ok(())
    }

    fn endpoint(&self, id: EndpointId) -> Option<Arc<Endpoint>> {
        self.pair.read().as_ref().and_then(|pair| pair.get(id)).cloned()
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Forward an endpoint's transport events: local candidates to the
    /// peer, state and media changes to subscribers
    fn spawn_event_pump(&self, endpoint: &Arc<Endpoint>) {
        let Some(mut transport_events) = endpoint.take_events() else {
            return;
        };
        let endpoint = Arc::clone(endpoint);
        let channel = Arc::clone(&self.channel);
        let events = self.events.clone();

        self.track(tokio::spawn(async move {
            while let Some(event) = transport_events.recv().await {
                match event {
                    TransportEvent::LocalCandidate(init) => {
                        let Some(candidate) = endpoint.stamp_candidate(init) else {
                            continue;
                        };
                        let target = endpoint.id().peer();
                        debug!(
                            "Relaying candidate #{} from {} to {}",
                            candidate.sequence,
                            endpoint.id(),
                            target
                        );
                        if let Err(e) = channel
                            .send(target, SignalingMessage::Candidate(candidate))
                            .await
                        {
                            warn!("Candidate lost: {}", e);
                        }
                    }
                    TransportEvent::StateChanged(state) => {
                        if !endpoint.record_transport_state(state) {
                            continue;
                        }
                        if state == TransportState::Failed {
                            warn!("Transport of {} endpoint reported failure", endpoint.id());
                        } else {
                            info!("Transport of {} endpoint is {}", endpoint.id(), state);
                        }
                        let _ = events.send(CallEvent::TransportStateChanged {
                            endpoint: endpoint.id(),
                            state,
                        });
                    }
                    TransportEvent::RemoteMedia(media) => {
                        info!(
                            "{} endpoint receiving remote {} track {}",
                            endpoint.id(),
                            media.kind,
                            media.track_id
                        );
                        let _ = events.send(CallEvent::RemoteMediaReceived {
                            endpoint: endpoint.id(),
                            media,
                        });
                    }
                }
            }
        }));
    }

    async fn dispatch(self: Arc<Self>, target: EndpointId, message: SignalingMessage) {
        let kind = message.kind();
        let Some(endpoint) = self.endpoint(target) else {
            debug!("No call in progress, ignoring {} for {}", kind, target);
            return;
        };
        if endpoint.is_terminal() {
            debug!(
                "Ignoring {} for {} endpoint in state {}",
                kind,
                target,
                endpoint.state()
            );
            return;
        }

        match message {
            SignalingMessage::Offer(offer) => {
                if offer.kind() != SdpType::Offer {
                    warn!("Ignoring {} sent as an offer to {}", offer.kind(), target);
                    return;
                }
                if !endpoint.claim_remote_description(ConnectionState::New) {
                    debug!(
                        "Ignoring repeated offer for {} endpoint in state {}",
                        target,
                        endpoint.state()
                    );
                    return;
                }
                let this = Arc::clone(&self);
                self.track(tokio::spawn(async move {
                    if let Err(e) = this.accept_offer(&endpoint, offer).await {
                        this.abort_round(&endpoint, e).await;
                    }
                }));
            }
            SignalingMessage::Answer(answer) => {
                if answer.kind() != SdpType::Answer {
                    warn!("Ignoring {} sent as an answer to {}", answer.kind(), target);
                    return;
                }
                if !endpoint.claim_remote_description(ConnectionState::HaveRemoteAnswerPending) {
                    debug!(
                        "Ignoring repeated answer for {} endpoint in state {}",
                        target,
                        endpoint.state()
                    );
                    return;
                }
                let this = Arc::clone(&self);
                self.track(tokio::spawn(async move {
                    if let Err(e) = this.accept_answer(&endpoint, answer).await {
                        this.abort_round(&endpoint, e).await;
                    }
                }));
            }
            SignalingMessage::Candidate(candidate) => {
                if let Err(e) = self.submit_remote_candidate(&endpoint, candidate).await {
                    warn!("{}", e);
                }
            }
            SignalingMessage::Hangup => {
                if self.round.lock().take().is_some() {
                    debug!("Peer hung up during negotiation");
                }
                if let Some(transition) = endpoint.close().await {
                    self.record(transition);
                    info!("{} endpoint hung up by peer", target);
                }
            }
        }
    }
}

/// Routes inbound signaling to the coordinator without keeping it alive
struct InboundRouter {
    coordinator: Weak<NegotiationCoordinator>,
}

#[async_trait]
impl SignalingHandler for InboundRouter {
    async fn on_message(&self, target: EndpointId, message: SignalingMessage) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.dispatch(target, message).await;
        }
    }
}
