//! Variant selection over frame and status streams.
//!
//! A selector is a plain projection `Fn(Frame) -> Option<T>`: it returns the
//! payload of the variant it targets and `None` for everything else. Close
//! frames never reach the selector; they are routed to the close callback.

use futures::future;
use futures::{Stream, StreamExt};

use crate::error::TransportError;
use crate::session::{CloseCode, ConnectionStatus, Frame, Message};

pub fn message(frame: Frame) -> Option<Message> {
    match frame {
        Frame::Message(message) => Some(message),
        _ => None,
    }
}

pub fn text(frame: Frame) -> Option<String> {
    match frame {
        Frame::Message(Message::Text(text)) => Some(text),
        _ => None,
    }
}

pub fn binary(frame: Frame) -> Option<Vec<u8>> {
    match frame {
        Frame::Message(Message::Binary(bytes)) => Some(bytes),
        _ => None,
    }
}

pub fn ping(frame: Frame) -> Option<Vec<u8>> {
    match frame {
        Frame::Ping(payload) => Some(payload),
        _ => None,
    }
}

pub fn pong(frame: Frame) -> Option<Vec<u8>> {
    match frame {
        Frame::Pong(payload) => Some(payload),
        _ => None,
    }
}

/// Status selector keeping only `Connected`.
pub fn connected(status: ConnectionStatus) -> Option<()> {
    match status {
        ConnectionStatus::Connected => Some(()),
        _ => None,
    }
}

/// Status selector keeping the non-terminal transitions.
pub fn transitions(status: ConnectionStatus) -> Option<ConnectionStatus> {
    match status {
        ConnectionStatus::Connecting | ConnectionStatus::Connected => Some(status),
        _ => None,
    }
}

pub fn filter_case<St, T, S, C>(stream: St, mut selector: S, mut on_close: C) -> impl Stream<Item = T>
where
    St: Stream<Item = Frame>,
    S: FnMut(Frame) -> Option<T>,
    C: FnMut(CloseCode),
{
    stream.filter_map(move |frame| {
        let selected = match frame {
            Frame::Close(code) => {
                on_close(code);
                None
            }
            other => selector(other),
        };
        future::ready(selected)
    })
}

/// Like [`filter_case`], with `DidClose` and `DidFail` reported through their
/// own callbacks and removed from the output.
pub fn filter_status<St, T, S, C, F>(
    stream: St,
    mut selector: S,
    mut on_did_close: C,
    mut on_did_fail: F,
) -> impl Stream<Item = T>
where
    St: Stream<Item = ConnectionStatus>,
    S: FnMut(ConnectionStatus) -> Option<T>,
    C: FnMut(CloseCode),
    F: FnMut(TransportError),
{
    stream.filter_map(move |status| {
        let selected = match status {
            ConnectionStatus::DidClose(code) => {
                on_did_close(code);
                None
            }
            ConnectionStatus::DidFail(error) => {
                on_did_fail(error);
                None
            }
            other => selector(other),
        };
        future::ready(selected)
    })
}
