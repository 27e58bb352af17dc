//! Stream operators for frame and status streams.
//!
//! Everything here is stateless: operators can be stacked per consumer
//! without coordinating with the session that produced the stream.

pub mod case;
mod decode;
mod logging;

use futures::Stream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

pub use decode::{decode, decode_ok, Decoder, JsonDecoder};
pub use logging::{
    EventLogger, LogEntry, LoggingOption, SessionLogger, Timing, TracingLogger, CONNECTION_LABEL,
    FRAME_LABEL,
};

use crate::error::{DecodeError, TransportError};
use crate::session::{CloseCode, ConnectionStatus, Frame, Message};

/// Forwards every element unchanged after handing it to `action`.
pub fn tap<St, F>(stream: St, mut action: F) -> impl Stream<Item = St::Item>
where
    St: Stream,
    F: FnMut(&St::Item),
{
    stream.inspect(move |item| action(item))
}

/// Forwards every element unchanged after dumping it through `logger`.
pub fn log_with<St>(
    stream: St,
    logger: Arc<dyn EventLogger>,
    label: &'static str,
) -> impl Stream<Item = St::Item>
where
    St: Stream,
    St::Item: fmt::Debug,
{
    stream.inspect(move |item| {
        logger.log(LogEntry {
            label,
            connection: None,
            timing: None,
            event: item,
        })
    })
}

pub trait FrameStreamExt: Stream<Item = Frame> + Sized {
    /// Keeps the payload picked by `selector`; each close frame goes to
    /// `on_close` and is dropped.
    fn filter_case<T, S, C>(self, selector: S, on_close: C) -> impl Stream<Item = T>
    where
        S: FnMut(Frame) -> Option<T>,
        C: FnMut(CloseCode),
    {
        case::filter_case(self, selector, on_close)
    }

    fn messages(self) -> impl Stream<Item = Message> {
        case::filter_case(self, case::message, |_| {})
    }

    fn log_frames(self) -> impl Stream<Item = Frame> {
        log_with(self, Arc::new(TracingLogger), FRAME_LABEL)
    }
}

impl<St: Stream<Item = Frame>> FrameStreamExt for St {}

pub trait MessageStreamExt: Stream<Item = Message> + Sized {
    fn decode<T, D>(self, decoder: D) -> impl Stream<Item = Result<T, DecodeError>>
    where
        T: DeserializeOwned,
        D: Decoder,
    {
        decode::decode::<Self, T, D>(self, decoder)
    }

    fn decode_ok<T, D, F>(self, decoder: D, on_failure: F) -> impl Stream<Item = T>
    where
        T: DeserializeOwned,
        D: Decoder,
        F: FnMut(DecodeError),
    {
        decode::decode_ok::<Self, T, D, F>(self, decoder, on_failure)
    }
}

impl<St: Stream<Item = Message>> MessageStreamExt for St {}

pub trait StatusStreamExt: Stream<Item = ConnectionStatus> + Sized {
    fn filter_status<T, S, C, F>(
        self,
        selector: S,
        on_did_close: C,
        on_did_fail: F,
    ) -> impl Stream<Item = T>
    where
        S: FnMut(ConnectionStatus) -> Option<T>,
        C: FnMut(CloseCode),
        F: FnMut(TransportError),
    {
        case::filter_status(self, selector, on_did_close, on_did_fail)
    }

    fn log_status(self) -> impl Stream<Item = ConnectionStatus> {
        log_with(self, Arc::new(TracingLogger), CONNECTION_LABEL)
    }
}

impl<St: Stream<Item = ConnectionStatus>> StatusStreamExt for St {}

pub trait TapExt: Stream + Sized {
    fn tap<F>(self, action: F) -> impl Stream<Item = Self::Item>
    where
        F: FnMut(&Self::Item),
    {
        tap(self, action)
    }

    fn log_with(self, logger: Arc<dyn EventLogger>, label: &'static str) -> impl Stream<Item = Self::Item>
    where
        Self::Item: fmt::Debug,
    {
        log_with(self, logger, label)
    }
}

impl<St: Stream> TapExt for St {}
