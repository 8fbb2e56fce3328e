//! [`PeerTransport`] backed by a webrtc-rs peer connection

use super::{PeerTransport, TransportEvent, TransportFactory, TransportHandle, TransportState};
use crate::config::{CallConfig, OfferOptions};
use crate::description::{SdpType, SessionDescription};
use crate::media::{LocalMedia, MediaKind, RemoteMedia};
use crate::peer::{CandidateInit, EndpointId, IceCandidate};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds one [`RtcPeerTransport`] per endpoint from the call configuration
pub struct RtcTransportFactory {
    config: CallConfig,
}

impl RtcTransportFactory {
    pub fn new(config: CallConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(&self, endpoint: EndpointId) -> Result<TransportHandle> {
        let (transport, events) = RtcPeerTransport::new(endpoint, &self.config).await?;
        Ok(TransportHandle {
            transport: Arc::new(transport),
            events,
        })
    }
}

/// webrtc-rs peer connection driven by the negotiation layer
pub struct RtcPeerTransport {
    endpoint: EndpointId,
    peer_connection: Arc<RTCPeerConnection>,

    /// RTP senders (retained so local tracks stay attached)
    senders: RwLock<Vec<Arc<RTCRtpSender>>>,

    /// Kinds this transport sends
    sending: parking_lot::Mutex<HashSet<MediaKind>>,
}

impl RtcPeerTransport {
    /// Create the peer connection and wire its callbacks into an event stream
    #[instrument(skip(config), fields(endpoint = %endpoint))]
    pub async fn new(
        endpoint: EndpointId,
        config: &CallConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self::install_handlers(endpoint, &peer_connection, events_tx);

        info!("Created peer connection for {} endpoint", endpoint);

        Ok((
            Self {
                endpoint,
                peer_connection,
                senders: RwLock::new(Vec::new()),
                sending: parking_lot::Mutex::new(HashSet::new()),
            },
            events_rx,
        ))
    }

    fn install_handlers(
        endpoint: EndpointId,
        peer_connection: &Arc<RTCPeerConnection>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let candidate_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete for {} endpoint", endpoint);
                    return;
                };
                match candidate.to_json() {
                    Ok(json) => {
                        let init = CandidateInit {
                            candidate: json.candidate,
                            sdp_mid: json.sdp_mid,
                            sdp_m_line_index: json.sdp_mline_index,
                        };
                        let _ = events.send(TransportEvent::LocalCandidate(init));
                    }
                    Err(e) => warn!("Failed to serialize local candidate on {}: {}", endpoint, e),
                }
            })
        }));

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_tx.clone();
                Box::pin(async move {
                    let state = match s {
                        RTCPeerConnectionState::New => TransportState::New,
                        RTCPeerConnectionState::Connecting => TransportState::Connecting,
                        RTCPeerConnectionState::Connected => TransportState::Connected,
                        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                        RTCPeerConnectionState::Failed => TransportState::Failed,
                        RTCPeerConnectionState::Closed => TransportState::Closed,
                        _ => return,
                    };
                    let _ = events.send(TransportEvent::StateChanged(state));
                })
            },
        ));

        let track_tx = events;
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_tx.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        RTPCodecType::Video => MediaKind::Video,
                        _ => return,
                    };
                    debug!(
                        "{} endpoint received {} track, codec={}",
                        endpoint,
                        kind,
                        track.codec().capability.mime_type
                    );
                    let _ = events.send(TransportEvent::RemoteMedia(RemoteMedia {
                        track_id: track.id(),
                        stream_id: track.stream_id(),
                        kind,
                    }));
                })
            },
        ));
    }

    fn codec_for(kind: MediaKind) -> RTCRtpCodecCapability {
        match kind {
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        }
    }

    fn to_rtc(description: &SessionDescription) -> Result<RTCSessionDescription> {
        let sdp = description.sdp().to_string();
        match description.kind() {
            SdpType::Offer => RTCSessionDescription::offer(sdp),
            SdpType::Answer => RTCSessionDescription::answer(sdp),
        }
        .map_err(|e| Error::SdpError(format!("Failed to parse {}: {}", description.kind(), e)))
    }

    async fn add_receive_only(&self, kind: MediaKind) -> Result<()> {
        let codec_type = match kind {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        };
        self.peer_connection
            .add_transceiver_from_kind(
                codec_type,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                Error::MediaTrackError(format!("Failed to add {} transceiver: {}", kind, e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn add_local_media(&self, media: &LocalMedia) -> Result<()> {
        for info in media.tracks() {
            let track = Arc::new(TrackLocalStaticSample::new(
                Self::codec_for(info.kind),
                info.id.clone(),
                media.stream_id().to_string(),
            ));

            let sender = self
                .peer_connection
                .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| {
                    Error::MediaTrackError(format!("Failed to add {} track: {}", info.kind, e))
                })?;

            self.senders.write().await.push(sender);
            self.sending.lock().insert(info.kind);
            debug!(
                "Added {} track {} to {} endpoint",
                info.kind, info.id, self.endpoint
            );
        }
        Ok(())
    }

    async fn create_offer(&self, options: &OfferOptions) -> Result<SessionDescription> {
        let sending = self.sending.lock().clone();
        if options.offer_to_receive_video && !sending.contains(&MediaKind::Video) {
            self.add_receive_only(MediaKind::Video).await?;
        }
        if options.offer_to_receive_audio && !sending.contains(&MediaKind::Audio) {
            self.add_receive_only(MediaKind::Audio).await?;
        }

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        let rtc = Self::to_rtc(description)?;
        self.peer_connection
            .set_local_description(rtc)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let rtc = Self::to_rtc(description)?;
        self.peer_connection
            .set_remote_description(rtc)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.init.candidate.clone(),
            sdp_mid: candidate.init.sdp_mid.clone(),
            sdp_mline_index: candidate.init.sdp_m_line_index,
            ..Default::default()
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.senders.write().await.clear();
        self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })
    }
}
