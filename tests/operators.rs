mod common;

use futures::StreamExt;
use serde::Deserialize;
use ws_sessions::operators::case;
use ws_sessions::{
    CloseCode, ConnectionId, Frame, FrameStreamExt, JsonDecoder, MessageStreamExt, Settings,
    StatusStreamExt, TapExt,
};

use common::{manager, spawn_echo_server, WAIT};

#[derive(Debug, Deserialize, PartialEq)]
struct Tick {
    seq: u32,
}

#[test_log::test(tokio::test)]
async fn test_decode_skips_malformed_payloads() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("ticks");

    manager.connect(Settings::builder("ticks", url).build()).await.unwrap();
    let frames = manager.receive(&id).unwrap();

    manager.send(&id, Frame::text(r#"{"seq":1}"#)).unwrap();
    manager.send(&id, Frame::text("not json")).unwrap();
    manager.send(&id, Frame::binary(br#"{"seq":2}"#.to_vec())).unwrap();

    let mut failures = 0;
    let ticks = frames
        .messages()
        .decode_ok(JsonDecoder, |_| failures += 1)
        .take(2)
        .collect::<Vec<Tick>>();
    let ticks = tokio::time::timeout(WAIT, ticks).await.unwrap();

    assert_eq!(ticks, vec![Tick { seq: 1 }, Tick { seq: 2 }]);
    assert_eq!(failures, 1);
}

#[test_log::test(tokio::test)]
async fn test_filter_case_reports_close() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("texts");

    manager.connect(Settings::builder("texts", url).build()).await.unwrap();
    let frames = manager.receive(&id).unwrap();
    let later = manager.receive(&id).unwrap();

    manager.send(&id, Frame::text("a")).unwrap();
    manager.send(&id, Frame::binary(vec![1])).unwrap();
    manager.send(&id, Frame::text("b")).unwrap();

    let mut seen = 0;
    let texts = frames
        .tap(|_| seen += 1)
        .filter_case(case::text, |_| {})
        .take(2)
        .collect::<Vec<String>>();
    let texts = tokio::time::timeout(WAIT, texts).await.unwrap();
    assert_eq!(texts, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(seen, 3);

    // The second subscriber keeps the session alive.
    assert!(manager.contains(&id));
    manager.close(&id, CloseCode::Normal).unwrap();

    let mut closed = None;
    let messages = later
        .filter_case(case::message, |code| closed = Some(code))
        .collect::<Vec<_>>();
    let messages = tokio::time::timeout(WAIT, messages).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(closed, Some(CloseCode::Normal));
}

#[test_log::test(tokio::test)]
async fn test_filter_status_sees_connected_and_close() {
    let url = spawn_echo_server().await;
    let manager = manager();
    let id = ConnectionId::from("status");

    let status = manager.open(Settings::builder("status", url).build()).unwrap();
    let mut status = Box::pin(
        status
            .log_status()
            .filter_status(case::connected, |_| {}, |e| panic!("unexpected failure: {}", e)),
    );

    let connected = tokio::time::timeout(WAIT, status.next()).await.unwrap();
    assert_eq!(connected, Some(()));

    manager.close(&id, CloseCode::Normal).unwrap();
    let end = tokio::time::timeout(WAIT, status.next()).await.unwrap();
    assert_eq!(end, None);
}
