use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{ConnectRequest, EventSink, Transport, TransportHandle};
use crate::error::TransportError;
use crate::session::{CloseCode, ConnectionId, Frame, Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default engine: one reader task and one writer task per connection, both
/// spawned on the runtime that ran the handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: EventSink,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let ConnectRequest {
            id,
            url,
            headers,
            config,
            ping_interval,
        } = request;

        let mut client_request = url.as_str().into_client_request()?;
        for (name, value) in &headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| TransportError::Handshake(e.to_string()))?;
            client_request.headers_mut().append(name, value);
        }

        let handshake = connect_async_with_config(
            client_request,
            Some(config.websocket_config()),
            config.disable_nagle,
        );
        let (socket, response) = timeout(config.handshake_timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout)??;
        info!(
            "WebSocket handshake with {} completed for connection {} ({})",
            url,
            id,
            response.status()
        );

        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(id, sink, rx, ping_interval, closed.clone()));
        tokio::spawn(read_loop(stream, events, closed.clone()));

        Ok(Arc::new(TungsteniteHandle { tx, closed }))
    }
}

struct TungsteniteHandle {
    tx: mpsc::UnboundedSender<WsMessage>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle for TungsteniteHandle {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if frame.is_close() {
            self.closed.store(true, Ordering::Release);
        }
        self.tx
            .send(into_ws_message(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

fn into_ws_message(frame: Frame) -> WsMessage {
    match frame {
        Frame::Message(Message::Text(text)) => WsMessage::Text(text),
        Frame::Message(Message::Binary(bytes)) => WsMessage::Binary(bytes),
        Frame::Ping(payload) => WsMessage::Ping(payload),
        Frame::Pong(payload) => WsMessage::Pong(payload),
        Frame::Close(code) => WsMessage::Close(Some(CloseFrame {
            code,
            reason: "".into(),
        })),
    }
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    ping_interval: Option<Duration>,
    closed: Arc<AtomicBool>,
) {
    let mut heartbeat = ping_interval.map(|period| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let message = tokio::select! {
            next = rx.recv() => match next {
                Some(message) => message,
                None => break,
            },
            _ = next_heartbeat(&mut heartbeat) => WsMessage::Ping(Vec::new()),
        };

        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = sink.send(message).await {
            error!("Error sending WebSocket message on connection {}: {}", id, e);
            break;
        }
        if closing {
            debug!("Close frame written for connection {}", id);
            break;
        }
    }

    closed.store(true, Ordering::Release);
    if let Err(e) = sink.close().await {
        debug!("Error closing WebSocket sink for connection {}: {}", id, e);
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: EventSink, closed: Arc<AtomicBool>) {
    let mut reported = false;

    while let Some(next) = stream.next().await {
        let frame = match next {
            Ok(WsMessage::Text(text)) => Frame::text(text),
            Ok(WsMessage::Binary(bytes)) => Frame::binary(bytes),
            Ok(WsMessage::Ping(payload)) => Frame::Ping(payload),
            Ok(WsMessage::Pong(payload)) => Frame::Pong(payload),
            Ok(WsMessage::Close(close)) => {
                closed.store(true, Ordering::Release);
                if !reported {
                    reported = true;
                    events.closed(close.map_or(CloseCode::Status, |frame| frame.code));
                }
                // Keep reading so the engine can finish the close handshake.
                continue;
            }
            Ok(WsMessage::Frame(_)) => continue,
            Err(e) => {
                closed.store(true, Ordering::Release);
                if !reported {
                    reported = true;
                    warn!("Error receiving WebSocket message on connection {}: {}", events.id(), e);
                    events.failed(e.into());
                }
                break;
            }
        };
        events.frame(frame);
    }

    closed.store(true, Ordering::Release);
    if !reported {
        events.closed(CloseCode::Abnormal);
    }
    debug!("Reader finished for connection {}", events.id());
}
