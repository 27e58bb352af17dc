//! Concurrent WebSocket client sessions, each exposed as a pair of
//! cancellable streams: inbound frames and connection status.

pub mod config;
pub mod error;
pub mod operators;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use config::ClientConfig;
pub use error::{DecodeError, SessionError, TransportError};
pub type Result<T> = std::result::Result<T, SessionError>;

pub use operators::{
    FrameStreamExt, JsonDecoder, LoggingOption, MessageStreamExt, StatusStreamExt, TapExt,
};
pub use session::{
    CloseCode, ConnectionId, ConnectionStatus, Frame, FrameStream, Message, Registry,
    SessionManager, Settings, SettingsBuilder, StatusStream,
};
pub use transport::{Transport, TransportConfig, TransportHandle, TungsteniteTransport};
