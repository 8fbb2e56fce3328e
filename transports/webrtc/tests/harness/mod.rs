//! Negotiation test harness
//!
//! Provides:
//! - `MockTransport` / `MockTransportFactory`: scripted transports
//! - `RecordingChannel`: loopback signaling with send recording and
//!   injectable delivery failures
//! - `CallFixture`: a coordinator wired to two mock endpoints with local
//!   media attached

#![allow(dead_code)]

pub mod mock_transport;
pub mod recording_channel;

use peercall_webrtc::media::{LocalMedia, MediaKind, MediaTrackInfo};
use peercall_webrtc::{
    CallConfig, CallEvent, CandidateInit, Endpoint, EndpointId, NegotiationCoordinator,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub use mock_transport::{Gate, MockTransport, MockTransportFactory, Op, TransportCall};
pub use recording_channel::RecordingChannel;

/// SDP produced by the local (offering) mock
pub const SDP_A: &str = "v=0\r\no=- 1001 1 IN IP4 127.0.0.1\r\ns=local\r\nt=0 0\r\n";

/// SDP produced by the remote (answering) mock
pub const SDP_B: &str = "v=0\r\no=- 2002 1 IN IP4 127.0.0.1\r\ns=remote\r\nt=0 0\r\n";

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Event stream closed")]
    EventsClosed,
}

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,peercall_webrtc=debug")
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F) -> HarnessResult<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::Timeout(what.to_string()));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// Await `future` with a test-sized bound
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(value) => value,
        Err(_) => panic!("operation did not complete within 5s"),
    }
}

/// Collect events until `stop` matches one
pub async fn collect_until<F>(
    events: &mut broadcast::Receiver<CallEvent>,
    mut stop: F,
) -> HarnessResult<Vec<CallEvent>>
where
    F: FnMut(&CallEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .map_err(|_| HarnessError::Timeout("call event".to_string()))?
            .map_err(|_| HarnessError::EventsClosed)?;
        let done = stop(&event);
        seen.push(event);
        if done {
            return Ok(seen);
        }
    }
}

/// Host candidate number `n`
pub fn host_candidate(n: u16) -> CandidateInit {
    let mut init = CandidateInit::new(format!(
        "candidate:{} 1 udp 2130706431 192.168.1.{} {} typ host",
        n,
        10 + n,
        50000 + n
    ));
    init.sdp_mid = Some("0".to_string());
    init.sdp_m_line_index = Some(0);
    init
}

pub fn test_media() -> LocalMedia {
    LocalMedia::new(
        "stream-test",
        vec![MediaTrackInfo {
            id: "video-test".to_string(),
            kind: MediaKind::Video,
            label: "Test camera".to_string(),
        }],
    )
}

pub fn test_config() -> CallConfig {
    CallConfig {
        negotiation_timeout_ms: 2_000,
        ..Default::default()
    }
}

/// Coordinator plus two mock endpoints, local media attached
pub struct CallFixture {
    pub coordinator: Arc<NegotiationCoordinator>,
    pub channel: Arc<RecordingChannel>,
    pub local: Arc<Endpoint>,
    pub remote: Arc<Endpoint>,
    pub local_transport: Arc<MockTransport>,
    pub remote_transport: Arc<MockTransport>,
}

impl CallFixture {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: CallConfig) -> Self {
        let fixture = Self::without_media(config);
        fixture
            .local
            .attach_local_media(&test_media())
            .await
            .expect("attach local media");
        fixture
    }

    pub fn without_media(config: CallConfig) -> Self {
        let channel = RecordingChannel::new();
        let coordinator = NegotiationCoordinator::new(config, channel.clone());

        let (local_transport, local_events) = MockTransport::for_endpoint(EndpointId::Local);
        let (remote_transport, remote_events) = MockTransport::for_endpoint(EndpointId::Remote);

        let local = Arc::new(Endpoint::new(
            EndpointId::Local,
            local_transport.handle(local_events),
        ));
        let remote = Arc::new(Endpoint::new(
            EndpointId::Remote,
            remote_transport.handle(remote_events),
        ));

        Self {
            coordinator,
            channel,
            local,
            remote,
            local_transport,
            remote_transport,
        }
    }

    pub async fn initiate(&self) -> peercall_webrtc::Result<()> {
        self.coordinator
            .initiate_call(&self.local, &self.remote)
            .await
    }

    /// Run `initiate_call` on a background task
    pub fn spawn_initiate(&self) -> tokio::task::JoinHandle<peercall_webrtc::Result<()>> {
        let coordinator = Arc::clone(&self.coordinator);
        let local = Arc::clone(&self.local);
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move { coordinator.initiate_call(&local, &remote).await })
    }

    pub async fn hangup(&self) -> peercall_webrtc::Result<()> {
        self.coordinator.hangup(&self.local, &self.remote).await
    }
}
