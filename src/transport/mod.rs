//! Boundary with the WebSocket engine.
//!
//! The session layer only needs three things from a transport: a
//! connect-and-upgrade primitive that reports inbound events through an
//! [`EventSink`], outbound writes, and an open/closed query. The default
//! engine is [`TungsteniteTransport`].

mod runtime;
mod websocket;

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::debug;
use url::Url;

pub use self::runtime::TransportRuntime;
pub use self::websocket::TungsteniteTransport;

use crate::config::TransportSection;
use crate::error::TransportError;
use crate::session::registry::{Registry, Termination};
use crate::session::{CloseCode, ConnectionId, Frame};

/// Engine settings handed through to the transport untouched by the session
/// layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub handshake_timeout: Duration,
    pub max_message_size: Option<usize>,
    pub max_frame_size: Option<usize>,
    pub write_buffer_size: usize,
    pub accept_unmasked_frames: bool,
    pub disable_nagle: bool,
}

impl TransportConfig {
    pub(crate) fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_frame_size;
        config.write_buffer_size = self.write_buffer_size;
        config.accept_unmasked_frames = self.accept_unmasked_frames;
        config
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
            write_buffer_size: 128 * 1024,
            accept_unmasked_frames: false,
            disable_nagle: true,
        }
    }
}

impl From<&TransportSection> for TransportConfig {
    fn from(section: &TransportSection) -> Self {
        Self {
            handshake_timeout: section.handshake_timeout(),
            max_message_size: Some(section.max_message_size),
            max_frame_size: Some(section.max_frame_size),
            write_buffer_size: section.write_buffer_size,
            accept_unmasked_frames: section.accept_unmasked_frames,
            disable_nagle: section.disable_nagle,
        }
    }
}

/// Everything the transport needs to dial one session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub id: ConnectionId,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub config: TransportConfig,
    pub ping_interval: Option<Duration>,
}

/// Write side of an established connection.
#[cfg_attr(test, mockall::automock)]
pub trait TransportHandle: Send + Sync {
    /// Queues `frame` for writing. `Frame::Close` starts the close handshake.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Dials and upgrades. Runs on the shared transport runtime; inbound
    /// traffic must be reported through `events` only.
    async fn connect(
        &self,
        request: ConnectRequest,
        events: EventSink,
    ) -> Result<Arc<dyn TransportHandle>, TransportError>;
}

/// Hands transport events over to the registry, tagged with the session
/// epoch they belong to. Events for a session that is gone are dropped.
#[derive(Clone)]
pub struct EventSink {
    registry: Weak<Registry>,
    id: ConnectionId,
    epoch: u64,
}

impl EventSink {
    pub(crate) fn new(registry: Weak<Registry>, id: ConnectionId, epoch: u64) -> Self {
        Self { registry, id, epoch }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Delivers an inbound frame. Returns false once the session is gone.
    pub fn frame(&self, frame: Frame) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.dispatch_frame(&self.id, self.epoch, frame),
            None => false,
        }
    }

    /// Reports a close frame received from the peer.
    pub fn closed(&self, code: CloseCode) {
        self.terminate(Termination::PeerClose(code));
    }

    pub fn failed(&self, error: TransportError) {
        self.terminate(Termination::Failed(error));
    }

    fn terminate(&self, termination: Termination) {
        if let Some(registry) = self.registry.upgrade() {
            if !registry.remove(&self.id, Some(self.epoch), termination) {
                debug!("Ignoring transport event for closed connection {}", self.id);
            }
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .finish()
    }
}
