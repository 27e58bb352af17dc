mod common;

use std::time::Duration;
use ws_sessions::{
    CloseCode, ConnectionId, ConnectionStatus, Frame, SessionError, Settings, StatusStream,
};

use common::{manager, next, refused_url, spawn_echo_server, stays_quiet, CLOSE_AWAY};

async fn wait_connected(status: &mut StatusStream) {
    assert_eq!(next(status).await, Some(ConnectionStatus::Connecting));
    assert_eq!(next(status).await, Some(ConnectionStatus::Connected));
}

#[test_log::test(tokio::test)]
async fn test_echo_then_close() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("A");

    let mut status = manager.open(Settings::builder("A", url).build()).unwrap();
    wait_connected(&mut status).await;
    let mut frames = manager.receive(&id).unwrap();

    manager.send(&id, Frame::text("hi")).unwrap();
    assert_eq!(next(&mut frames).await, Some(Frame::text("hi")));

    manager.send(&id, Frame::Close(CloseCode::Normal)).unwrap();
    assert_eq!(next(&mut frames).await, Some(Frame::Close(CloseCode::Normal)));
    assert_eq!(next(&mut frames).await, None);
    assert_eq!(
        next(&mut status).await,
        Some(ConnectionStatus::DidClose(CloseCode::Normal))
    );
    assert_eq!(next(&mut status).await, None);

    assert_eq!(manager.session_count(), 0);
    assert!(matches!(
        manager.send(&id, Frame::text("again")),
        Err(SessionError::ConnectionClosed)
    ));
}

#[test_log::test(tokio::test)]
async fn test_second_open_of_live_id_fails() {
    let url = spawn_echo_server().await;
    let manager = manager();

    let mut status = manager.open(Settings::builder("A", url.clone()).build()).unwrap();
    wait_connected(&mut status).await;

    let err = manager.open(Settings::builder("A", url).build()).unwrap_err();
    assert!(matches!(err, SessionError::AlreadyOpened(_)));
    assert_eq!(manager.session_count(), 1);
    assert!(manager.is_connected(&"A".into()));
}

#[test_log::test(tokio::test)]
async fn test_non_websocket_url_is_rejected() {
    let manager = manager();

    let err = manager
        .open(Settings::builder("A", "http://127.0.0.1:9").build())
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidWebSocketUrlFormat(_)));
    assert_eq!(manager.session_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_sessions_are_isolated() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let (first, second) = (ConnectionId::from("1"), ConnectionId::from("2"));

    manager
        .connect(Settings::builder(first.clone(), url.clone()).build())
        .await
        .unwrap();
    manager
        .connect(Settings::builder(second.clone(), url).build())
        .await
        .unwrap();
    let mut first_frames = manager.receive(&first).unwrap();
    let mut second_frames = manager.receive(&second).unwrap();

    manager.send(&first, Frame::Ping(vec![1, 2, 3])).unwrap();
    assert_eq!(next(&mut first_frames).await, Some(Frame::Pong(vec![1, 2, 3])));
    assert!(stays_quiet(&mut second_frames, Duration::from_millis(200)).await);
    assert_eq!(manager.session_count(), 2);
}

#[test_log::test(tokio::test)]
async fn test_receivers_observe_same_sequence() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("A");

    manager.connect(Settings::builder("A", url).build()).await.unwrap();
    let mut first = manager.receive(&id).unwrap();
    let mut second = manager.receive(&id).unwrap();

    manager.send(&id, Frame::text("x")).unwrap();
    manager.send(&id, Frame::binary(vec![0xff])).unwrap();
    for frames in [&mut first, &mut second] {
        assert_eq!(next(frames).await, Some(Frame::text("x")));
        assert_eq!(next(frames).await, Some(Frame::binary(vec![0xff])));
    }
}

#[test_log::test(tokio::test)]
async fn test_frames_before_receive_are_kept() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("A");

    manager.connect(Settings::builder("A", url).build()).await.unwrap();
    assert!(manager.is_connected(&id));
    manager.send(&id, Frame::text("early")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut frames = manager.receive(&id).unwrap();
    assert_eq!(next(&mut frames).await, Some(Frame::text("early")));
}

#[test_log::test(tokio::test)]
async fn test_explicit_port_overrides_url() {
    let url = spawn_echo_server().await;
    let port: u16 = url.rsplit(':').next().unwrap().parse().unwrap();
    let manager = manager();

    let settings = Settings::builder("A", "ws://127.0.0.1:1")
        .port(port)
        .header("x-client", "ws-sessions")
        .build();
    manager.connect(settings).await.unwrap();
    assert!(manager.is_connected(&"A".into()));
}

#[test_log::test(tokio::test)]
async fn test_refused_handshake_fails_stream() {
    let url = refused_url().await;
    let manager = manager();

    let mut status = manager.open(Settings::builder("A", url.clone()).build()).unwrap();
    assert_eq!(next(&mut status).await, Some(ConnectionStatus::Connecting));
    assert!(matches!(
        next(&mut status).await,
        Some(ConnectionStatus::DidFail(_))
    ));
    assert_eq!(next(&mut status).await, None);
    assert_eq!(manager.session_count(), 0);

    let err = manager
        .connect(Settings::builder("B", url).build())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert!(!manager.contains(&"B".into()));
}

#[test_log::test(tokio::test)]
async fn test_dropping_frames_disconnects() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("A");

    let mut status = manager.open(Settings::builder("A", url).build()).unwrap();
    wait_connected(&mut status).await;

    let frames = manager.receive(&id).unwrap();
    drop(frames);

    assert!(!manager.contains(&id));
    assert_eq!(next(&mut status).await, Some(ConnectionStatus::Disconnected));
    assert_eq!(next(&mut status).await, None);
}

#[test_log::test(tokio::test)]
async fn test_peer_close_ends_both_streams() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("A");

    let mut status = manager.open(Settings::builder("A", url).build()).unwrap();
    wait_connected(&mut status).await;
    let mut frames = manager.receive(&id).unwrap();

    manager.send(&id, Frame::text(CLOSE_AWAY)).unwrap();
    assert_eq!(next(&mut frames).await, Some(Frame::Close(CloseCode::Away)));
    assert_eq!(next(&mut frames).await, None);
    assert_eq!(
        next(&mut status).await,
        Some(ConnectionStatus::DidClose(CloseCode::Away))
    );
    assert!(!manager.contains(&id));
}

#[test_log::test(tokio::test)]
async fn test_id_is_reusable_after_close() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("A");

    manager.connect(Settings::builder("A", url.clone()).build()).await.unwrap();
    manager.close(&id, CloseCode::Normal).unwrap();
    assert!(!manager.contains(&id));

    manager.connect(Settings::builder("A", url).build()).await.unwrap();
    let mut frames = manager.receive(&id).unwrap();
    manager.send(&id, Frame::text("again")).unwrap();
    assert_eq!(next(&mut frames).await, Some(Frame::text("again")));
}

#[test_log::test(tokio::test)]
async fn test_shutdown_closes_everything() {
    let url = spawn_echo_server().await;
    let manager = manager();

    let mut a = manager.open(Settings::builder("A", url.clone()).build()).unwrap();
    let mut b = manager.open(Settings::builder("B", url.clone()).build()).unwrap();
    wait_connected(&mut a).await;
    wait_connected(&mut b).await;

    manager.shutdown();
    for status in [&mut a, &mut b] {
        assert_eq!(
            next(status).await,
            Some(ConnectionStatus::DidClose(CloseCode::Away))
        );
        assert_eq!(next(status).await, None);
    }
    assert_eq!(manager.session_count(), 0);
    assert!(matches!(
        manager.open(Settings::builder("C", url).build()),
        Err(SessionError::TaskCancelled)
    ));
}
