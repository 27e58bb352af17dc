use crate::error::TransportError;

pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Application payload of a data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Raw payload bytes; text is handed out as its UTF-8 encoding.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A WebSocket-level unit of communication.
///
/// Continuation frames never surface here: fragments are reassembled by the
/// transport before they reach a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Message),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(CloseCode),
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Message(Message::Text(text.into()))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Frame::Message(Message::Binary(bytes.into()))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Frame::Message(Message::Text(_)) => "text",
            Frame::Message(Message::Binary(_)) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }
}

/// Lifecycle events published on a session's status stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    DidClose(CloseCode),
    DidFail(TransportError),
    Disconnected,
}

impl ConnectionStatus {
    /// True for the variants that end a status stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::DidClose(_)
                | ConnectionStatus::DidFail(_)
                | ConnectionStatus::Disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_bytes() {
        assert_eq!(Message::Text("hé".to_string()).into_bytes(), "hé".as_bytes());
        assert_eq!(Message::Binary(vec![1, 2, 3]).into_bytes(), vec![1, 2, 3]);
        assert!(Message::Text(String::new()).is_empty());
    }

    #[test]
    fn test_frame_constructors() {
        assert_eq!(Frame::text("hi"), Frame::Message(Message::Text("hi".to_string())));
        assert_eq!(Frame::binary(vec![7u8]).kind(), "binary");
        assert!(Frame::Close(CloseCode::Normal).is_close());
        assert!(!Frame::Ping(Vec::new()).is_close());
    }

    #[test]
    fn test_terminal_status() {
        assert!(ConnectionStatus::DidClose(CloseCode::Away).is_terminal());
        assert!(ConnectionStatus::DidFail(TransportError::Closed).is_terminal());
        assert!(ConnectionStatus::Disconnected.is_terminal());
        assert!(!ConnectionStatus::Connected.is_terminal());
        assert!(!ConnectionStatus::Connecting.is_terminal());
    }
}
