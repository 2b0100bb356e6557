//! Integration tests for channel options negotiation.

mod mock_server;

use std::collections::BTreeMap;

use realtime_channels::{
    codes, Action, ChannelEvent, ChannelMode, ChannelOptions, ChannelState, ProtocolMessage,
};
use serde_json::json;
use test_helpers::{connected_client, settle};
use tokio_test::{assert_pending, assert_ready, task};

#[tokio::test(start_paused = true)]
async fn test_options_before_attach_are_sent_with_attach() {
    let (client, server) = connected_client();
    let channel = client.channels().get("configured");

    let options = ChannelOptions::new()
        .with_param("rewind", "1")
        .with_modes([ChannelMode::Subscribe]);
    channel.set_options(options.clone()).await.unwrap();
    assert_eq!(channel.state(), ChannelState::Initialized);
    assert!(server.sent().is_empty());

    channel.attach().await.unwrap();
    assert_eq!(channel.channel_options(), options);

    let attach = &server.sent_on("configured", Action::Attach)[0];
    assert_eq!(attach.params.as_ref().and_then(|p| p.get("rewind")).map(String::as_str), Some("1"));
    assert_eq!(attach.modes, Some(vec![ChannelMode::Subscribe]));
    assert_eq!(channel.modes(), vec![ChannelMode::Subscribe]);
    assert_eq!(channel.params().get("rewind").map(String::as_str), Some("1"));

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_options_change_while_attached_reattaches() {
    let (client, server) = connected_client();
    let channel = client.channels().get("negotiated");
    channel.attach().await.unwrap();
    assert_eq!(channel.modes(), ChannelMode::defaults());
    let mut events = channel.events();

    channel
        .set_options(ChannelOptions::new().with_modes([ChannelMode::Publish, ChannelMode::Subscribe]))
        .await
        .unwrap();

    assert_eq!(server.sent_on("negotiated", Action::Attach).len(), 2);
    assert_eq!(channel.state(), ChannelState::Attached);
    assert_eq!(
        channel.modes(),
        vec![ChannelMode::Publish, ChannelMode::Subscribe]
    );

    match events.try_recv() {
        Some(ChannelEvent::Update(change)) => {
            assert_eq!(change.current, ChannelState::Attached);
            assert!(change.reason.is_none());
        }
        other => panic!("expected an update event, got {other:?}"),
    }

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_options_skip_reattach() {
    let (client, server) = connected_client();
    let channel = client.channels().get("steady");
    let options = ChannelOptions::new().with_param("delta", "vcdiff");
    channel.set_options(options.clone()).await.unwrap();
    channel.attach().await.unwrap();

    channel.set_options(options).await.unwrap();
    channel.set_options(ChannelOptions::new()).await.unwrap();

    assert_eq!(server.sent_on("steady", Action::Attach).len(), 1);

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_modes_param_overrides_requested_modes() {
    let (client, server) = connected_client();
    let channel = client.channels().get("override");

    let mut params = BTreeMap::new();
    params.insert("modes".to_string(), "subscribe,presence_subscribe".to_string());
    let options = ChannelOptions {
        params: Some(params),
        modes: Some(vec![ChannelMode::Publish]),
    };
    channel.set_options(options).await.unwrap();
    channel.attach().await.unwrap();

    let attach = &server.sent_on("override", Action::Attach)[0];
    assert_eq!(
        attach.modes,
        Some(vec![ChannelMode::Subscribe, ChannelMode::PresenceSubscribe])
    );

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_get_with_options_refuses_reattach() {
    let (client, server) = connected_client();
    let channels = client.channels();
    let channel = channels.get("guarded");
    channel.attach().await.unwrap();

    let error = channels
        .get_with_options("guarded", ChannelOptions::new().with_modes([ChannelMode::Subscribe]))
        .await
        .unwrap_err();
    assert_eq!(error.code, codes::BAD_REQUEST);
    assert_eq!(channel.channel_options(), ChannelOptions::new());
    assert_eq!(server.sent_on("guarded", Action::Attach).len(), 1);

    let fresh = channels
        .get_with_options("fresh", ChannelOptions::new().with_modes([ChannelMode::Subscribe]))
        .await
        .unwrap();
    fresh.attach().await.unwrap();
    assert_eq!(fresh.modes(), vec![ChannelMode::Subscribe]);

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_set_options_during_pending_attach_waits_for_server() {
    let (client, server) = connected_client();
    let channel = client.channels().get("room");
    server.ignore_attach("room");

    let attach = channel.attach();
    let options = ChannelOptions::new().with_param("delta", "vcdiff");
    let mut change = task::spawn(channel.set_options(options.clone()));
    settle().await;

    assert_pending!(change.poll());
    assert_eq!(channel.state(), ChannelState::Attaching);
    let attaches = server.sent_on("room", Action::Attach);
    assert_eq!(attaches.len(), 2);
    assert_eq!(
        attaches[1].params.as_ref().and_then(|p| p.get("delta")).map(String::as_str),
        Some("vcdiff")
    );

    server.deliver(ProtocolMessage::attached("room"));
    settle().await;

    assert_ready!(change.poll()).unwrap();
    attach.await.unwrap();
    assert_eq!(channel.channel_options(), options);
    assert_eq!(channel.params().get("delta").map(String::as_str), Some("vcdiff"));

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_set_options_during_pending_attach_reports_timeout() {
    let (client, server) = connected_client();
    let channel = client.channels().get("silent");
    server.ignore_attach("silent");

    let _attach = channel.attach();
    let error = channel
        .set_options(ChannelOptions::new().with_modes([ChannelMode::Subscribe]))
        .await
        .unwrap_err();

    assert_eq!(error.code, codes::TIMEOUT);
    assert_eq!(server.sent_on("silent", Action::Attach).len(), 2);

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_get_with_options_during_pending_attach_is_refused() {
    let (client, server) = connected_client();
    let channels = client.channels();
    let channel = channels.get("busy");
    server.ignore_attach("busy");

    let attach = channel.attach();
    let error = channels
        .get_with_options("busy", ChannelOptions::new().with_param("delta", "vcdiff"))
        .await
        .unwrap_err();
    assert_eq!(error.code, codes::BAD_REQUEST);

    server.deliver(ProtocolMessage::attached("busy"));
    attach.await.unwrap();
    assert_eq!(channel.channel_options(), ChannelOptions::new());
    assert_eq!(server.sent_on("busy", Action::Attach).len(), 1);
    assert!(channel.params().get("delta").is_none());

    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_options_from_json() {
    let (client, _server) = connected_client();
    let channel = client.channels().get("json");

    let options = ChannelOptions::try_from(json!({
        "params": {"rewind": 5, "occupancy": "metrics"},
        "modes": ["subscribe"]
    }))
    .unwrap();
    channel.set_options(options).await.unwrap();
    channel.attach().await.unwrap();
    assert_eq!(channel.params().get("rewind").map(String::as_str), Some("5"));

    let error = ChannelOptions::try_from(json!({"modes": ["teleport"]})).unwrap_err();
    assert_eq!(error.code, codes::BAD_REQUEST);

    let error = ChannelOptions::try_from(json!("not an object")).unwrap_err();
    assert_eq!(error.code, codes::BAD_REQUEST);

    client.close().await.unwrap();
}
