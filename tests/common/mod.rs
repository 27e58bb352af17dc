#![allow(dead_code)]

use futures::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use ws_sessions::{ClientConfig, SessionManager};

/// Text message that makes the echo server start a close handshake with
/// `CloseCode::Away` instead of echoing.
pub const CLOSE_AWAY: &str = "close-away";

pub const WAIT: Duration = Duration::from_secs(5);

/// Starts an echo server on an ephemeral port and returns its `ws://` URL.
pub async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(echo(stream));
        }
    });

    format!("ws://{}", addr)
}

/// URL of a port nobody listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

async fn echo(stream: TcpStream) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(ref text) if text == CLOSE_AWAY => {
                let frame = CloseFrame {
                    code: CloseCode::Away,
                    reason: "".into(),
                };
                if ws.close(Some(frame)).await.is_err() {
                    break;
                }
            }
            Message::Text(_) | Message::Binary(_) => {
                if ws.send(message).await.is_err() {
                    break;
                }
            }
            _ => {}
        }
    }
}

pub fn manager() -> SessionManager {
    let config = ClientConfig::new_for_test().unwrap();
    SessionManager::new(&config)
}

/// Next element of `stream`, failing the test if nothing arrives in time.
pub async fn next<S>(stream: &mut S) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("stream stalled")
}

/// True if `stream` yields nothing for `quiet`.
pub async fn stays_quiet<S>(stream: &mut S, quiet: Duration) -> bool
where
    S: Stream + Unpin,
{
    tokio::time::timeout(quiet, stream.next()).await.is_err()
}
