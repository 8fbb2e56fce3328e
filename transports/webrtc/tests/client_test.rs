//! Command surface tests: start / call / hangup over mock transports

mod harness;

use harness::{init_logging, test_config, within, MockTransportFactory, Op};
use peercall_webrtc::media::{MediaKind, SyntheticMediaSource};
use peercall_webrtc::{
    CallClient, CallConfig, ConnectionState, EndpointId, Error, LoopbackChannel,
};
use std::sync::Arc;

fn client_with(source: SyntheticMediaSource) -> (CallClient, Arc<MockTransportFactory>) {
    let factory = MockTransportFactory::new();
    let client = CallClient::new(
        test_config(),
        Arc::new(source),
        factory.clone(),
        Arc::new(LoopbackChannel::new()),
    )
    .unwrap();
    (client, factory)
}

fn client() -> (CallClient, Arc<MockTransportFactory>) {
    client_with(SyntheticMediaSource::new())
}

#[tokio::test]
async fn test_call_before_start_is_rejected() {
    init_logging();
    let (client, factory) = client();

    let err = within(client.call()).await.unwrap_err();
    assert!(matches!(err, Error::MediaAcquisition(_)), "got {err}");
    assert_eq!(factory.created_count(), 0);
    assert!(client.endpoint_states().is_none());
}

#[tokio::test]
async fn test_start_call_hangup() {
    init_logging();
    let (client, factory) = client();

    let media = within(client.start()).await.unwrap();
    assert!(media.has_kind(MediaKind::Video));
    assert!(media.has_kind(MediaKind::Audio));

    within(client.call()).await.unwrap();
    assert_eq!(
        client.endpoint_states(),
        Some((ConnectionState::Connected, ConnectionState::Connected))
    );

    let local = factory.latest(EndpointId::Local).unwrap();
    let remote = factory.latest(EndpointId::Remote).unwrap();
    assert_eq!(local.count(Op::AddLocalMedia), 1);
    assert_eq!(remote.count(Op::AddLocalMedia), 0);

    within(client.hangup()).await.unwrap();
    assert_eq!(
        client.endpoint_states(),
        Some((ConnectionState::Closed, ConnectionState::Closed))
    );

    // Hanging up again is a no-op
    within(client.hangup()).await.unwrap();
    assert_eq!(local.count(Op::Close), 1);
}

#[tokio::test]
async fn test_call_again_after_hangup() {
    init_logging();
    let (client, factory) = client();
    within(client.start()).await.unwrap();

    within(client.call()).await.unwrap();
    within(client.hangup()).await.unwrap();
    within(client.call()).await.unwrap();

    assert_eq!(factory.created_count(), 4);
    assert_eq!(
        client.endpoint_states(),
        Some((ConnectionState::Connected, ConnectionState::Connected))
    );
}

#[tokio::test]
async fn test_call_while_active_is_rejected() {
    init_logging();
    let (client, factory) = client();
    within(client.start()).await.unwrap();
    within(client.call()).await.unwrap();

    let err = within(client.call()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "got {err}");
    assert_eq!(factory.created_count(), 2);
}

#[tokio::test]
async fn test_media_failure_disables_calling() {
    init_logging();
    let (client, factory) = client_with(SyntheticMediaSource::new().with_video_device(None));

    let err = within(client.start()).await.unwrap_err();
    assert!(matches!(err, Error::MediaAcquisition(_)), "got {err}");
    assert!(client.local_media().is_none());

    let err = within(client.call()).await.unwrap_err();
    assert!(matches!(err, Error::MediaAcquisition(_)), "got {err}");
    assert_eq!(factory.created_count(), 0);
}

#[tokio::test]
async fn test_failed_call_reports_error_and_can_be_hung_up() {
    init_logging();
    let (client, factory) = client();
    factory.fail_on(EndpointId::Remote, Op::SetRemoteDescription, "bad fingerprint");
    within(client.start()).await.unwrap();

    let err = within(client.call()).await.unwrap_err();
    assert!(err.is_round_fatal());
    assert_eq!(
        client.endpoint_states(),
        Some((ConnectionState::HaveLocalOffer, ConnectionState::Failed))
    );

    within(client.hangup()).await.unwrap();
    assert_eq!(
        client.endpoint_states(),
        Some((ConnectionState::Closed, ConnectionState::Failed))
    );
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    init_logging();
    let config = CallConfig {
        negotiation_timeout_ms: 1,
        ..Default::default()
    };

    let result = CallClient::new(
        config,
        Arc::new(SyntheticMediaSource::new()),
        MockTransportFactory::new(),
        Arc::new(LoopbackChannel::new()),
    );
    match result {
        Err(err) => assert!(err.is_config_error()),
        Ok(_) => panic!("invalid timeout accepted"),
    }
}

#[tokio::test]
async fn test_media_attach_failure_releases_both_transports() {
    init_logging();
    let (client, factory) = client();
    factory.fail_on(EndpointId::Local, Op::AddLocalMedia, "no encoder");
    within(client.start()).await.unwrap();

    let err = within(client.call()).await.unwrap_err();
    assert!(matches!(err, Error::MediaTrackError(_)), "got {err}");

    let local = factory.latest(EndpointId::Local).unwrap();
    let remote = factory.latest(EndpointId::Remote).unwrap();
    assert_eq!(local.count(Op::Close), 1);
    assert_eq!(remote.count(Op::Close), 1);
    assert!(!local.was_called(Op::CreateOffer));
    assert!(client.endpoint_states().is_none());
}

#[tokio::test]
async fn test_remote_open_failure_releases_local_transport() {
    init_logging();
    let (client, factory) = client();
    factory.refuse(EndpointId::Remote);
    within(client.start()).await.unwrap();

    let err = within(client.call()).await.unwrap_err();
    assert!(matches!(err, Error::PeerConnectionError(_)), "got {err}");

    assert_eq!(factory.created_count(), 1);
    let local = factory.latest(EndpointId::Local).unwrap();
    assert_eq!(local.count(Op::Close), 1);
    assert!(client.endpoint_states().is_none());
}

#[tokio::test]
async fn test_concurrent_calls_start_one_call() {
    init_logging();
    let (client, factory) = client();
    within(client.start()).await.unwrap();

    let (first, second) = within(async { tokio::join!(client.call(), client.call()) }).await;

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(Error::InvalidState(_)))));
    assert_eq!(factory.created_count(), 2);
    assert_eq!(
        client.endpoint_states(),
        Some((ConnectionState::Connected, ConnectionState::Connected))
    );
}
