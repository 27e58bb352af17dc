use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::session::ConnectionId;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection {0} is already opened")]
    AlreadyOpened(ConnectionId),

    #[error("URL field is empty")]
    EmptyUrlField,

    #[error("Invalid WebSocket URL format: {0}")]
    InvalidWebSocketUrlFormat(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Task was cancelled")]
    TaskCancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for SessionError {
    fn from(err: config::ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}

/// Failures raised by the transport engine.
///
/// Carried by value inside `ConnectionStatus::DidFail`, so every variant holds
/// a rendered message instead of the engine's own error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Handshake timed out")]
    Timeout,

    #[error("Transport is closed")]
    Closed,

    #[error("Transport runtime error: {0}")]
    Runtime(String),
}

impl From<WsError> for TransportError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Io(e) => TransportError::Io(e.to_string()),
            WsError::Protocol(e) => TransportError::Protocol(e.to_string()),
            e @ (WsError::Url(_) | WsError::Http(_) | WsError::HttpFormat(_)) => {
                TransportError::Handshake(e.to_string())
            }
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Per-element failure produced by the decoding operators.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode failed: {0}")]
    Other(String),
}
