//! Command surface: `start`, `call`, `hangup`
//!
//! [`CallClient`] owns the collaborators of a two-party call (media source,
//! transport factory, signaling channel) and maps each command onto the
//! negotiation coordinator.

use crate::config::CallConfig;
use crate::media::{LocalMedia, MediaKind, MediaSource, SyntheticMediaSource};
use crate::negotiation::{CallEvent, NegotiationCoordinator};
use crate::peer::{ConnectionState, Endpoint, EndpointId};
use crate::signaling::{LoopbackChannel, SignalingChannel};
use crate::transport::{RtcTransportFactory, TransportFactory};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

#[derive(Clone)]
struct ActiveCall {
    local: Arc<Endpoint>,
    remote: Arc<Endpoint>,
}

impl ActiveCall {
    fn is_over(&self) -> bool {
        self.local.is_terminal() && self.remote.is_terminal()
    }
}

/// Two-party call between a local and a remote endpoint
pub struct CallClient {
    config: CallConfig,
    media_source: Arc<dyn MediaSource>,
    transports: Arc<dyn TransportFactory>,
    coordinator: Arc<NegotiationCoordinator>,
    local_media: RwLock<Option<LocalMedia>>,
    call: RwLock<Option<ActiveCall>>,
    setup_lane: tokio::sync::Mutex<()>,
}

impl CallClient {
    /// Create a client from its collaborators
    ///
    /// Must be called from within a Tokio runtime (the coordinator registers
    /// its signaling handler immediately).
    pub fn new(
        config: CallConfig,
        media_source: Arc<dyn MediaSource>,
        transports: Arc<dyn TransportFactory>,
        channel: Arc<dyn SignalingChannel>,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = NegotiationCoordinator::new(config.clone(), channel);

        Ok(Self {
            config,
            media_source,
            transports,
            coordinator,
            local_media: RwLock::new(None),
            call: RwLock::new(None),
            setup_lane: tokio::sync::Mutex::new(()),
        })
    }

    /// Client wired for an in-process call over real webrtc-rs transports
    pub fn loopback(config: CallConfig) -> Result<Self> {
        let transports = Arc::new(RtcTransportFactory::new(config.clone()));
        Self::new(
            config,
            Arc::new(SyntheticMediaSource::new()),
            transports,
            Arc::new(LoopbackChannel::new()),
        )
    }

    /// Acquire local media; calling is disabled until this succeeds
    pub async fn start(&self) -> Result<LocalMedia> {
        let acquired = self.local_media.read().clone();
        if let Some(media) = acquired {
            debug!("Local media already acquired");
            return Ok(media);
        }

        info!("Requesting local stream");
        let media = self
            .media_source
            .acquire(&self.config.media)
            .await
            .inspect_err(|e| error!("Failed to acquire local media: {}", e))?;

        info!(
            "Received local stream {} ({} track(s))",
            media.stream_id(),
            media.tracks().len()
        );
        *self.local_media.write() = Some(media.clone());
        Ok(media)
    }

    /// Set up both endpoints and negotiate the call
    pub async fn call(&self) -> Result<()> {
        let acquired = self.local_media.read().clone();
        let media = acquired.ok_or_else(|| {
            Error::MediaAcquisition("call requested before local media was acquired".to_string())
        })?;

        let (local, remote) = {
            let _setup = self.setup_lane.lock().await;

            let previous = self.call.read().clone();
            if let Some(previous) = previous {
                if !previous.is_over() {
                    return Err(Error::InvalidState(
                        "a call is already active; hang up first".to_string(),
                    ));
                }
                self.coordinator
                    .hangup(&previous.local, &previous.remote)
                    .await?;
            }

            info!("Starting call");
            if let Some(track) = media.first_track(MediaKind::Video) {
                info!("Using video device: {}", track.label);
            }
            if let Some(track) = media.first_track(MediaKind::Audio) {
                info!("Using audio device: {}", track.label);
            }

            let (local, remote) = self.open_endpoints(&media).await?;
            *self.call.write() = Some(ActiveCall {
                local: Arc::clone(&local),
                remote: Arc::clone(&remote),
            });
            (local, remote)
        };

        self.coordinator.initiate_call(&local, &remote).await
    }

    /// Open both endpoints and attach media to the local one
    ///
    /// Endpoints opened before a failing step are closed again.
    async fn open_endpoints(&self, media: &LocalMedia) -> Result<(Arc<Endpoint>, Arc<Endpoint>)> {
        let local = Endpoint::open(EndpointId::Local, self.transports.as_ref()).await?;

        let remote = match Endpoint::open(EndpointId::Remote, self.transports.as_ref()).await {
            Ok(remote) => remote,
            Err(e) => {
                error!("Failed to open remote endpoint: {}", e);
                local.close().await;
                return Err(e);
            }
        };

        if let Err(e) = local.attach_local_media(media).await {
            error!("Failed to add local stream: {}", e);
            futures::future::join(local.close(), remote.close()).await;
            return Err(e);
        }

        Ok((local, remote))
    }

    /// End the current call; a no-op without one or when already ended
    pub async fn hangup(&self) -> Result<()> {
        let current = self.call.read().clone();
        let Some(call) = current else {
            debug!("Hangup without an active call");
            return Ok(());
        };

        info!("Ending call");
        self.coordinator.hangup(&call.local, &call.remote).await
    }

    /// Subscribe to call events
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.coordinator.subscribe()
    }

    /// (local, remote) states of the most recent call
    pub fn endpoint_states(&self) -> Option<(ConnectionState, ConnectionState)> {
        self.call
            .read()
            .as_ref()
            .map(|call| (call.local.state(), call.remote.state()))
    }

    pub fn local_media(&self) -> Option<LocalMedia> {
        self.local_media.read().clone()
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }
}
