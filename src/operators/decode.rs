use futures::future;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::DecodeError;
use crate::session::Message;

/// Turns raw message bytes into a typed value.
pub trait Decoder {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Decodes every message, yielding the outcome of each attempt. A failure is
/// an element of the output, never the end of it.
pub fn decode<St, T, D>(stream: St, decoder: D) -> impl Stream<Item = Result<T, DecodeError>>
where
    St: Stream<Item = Message>,
    T: DeserializeOwned,
    D: Decoder,
{
    stream.map(move |message| decoder.decode::<T>(&message.into_bytes()))
}

/// Decodes every message and keeps the successes. Each failure is handed to
/// `on_failure` before being dropped.
pub fn decode_ok<St, T, D, F>(stream: St, decoder: D, mut on_failure: F) -> impl Stream<Item = T>
where
    St: Stream<Item = Message>,
    T: DeserializeOwned,
    D: Decoder,
    F: FnMut(DecodeError),
{
    decode::<St, T, D>(stream, decoder).filter_map(move |result| {
        future::ready(match result {
            Ok(value) => Some(value),
            Err(e) => {
                on_failure(e);
                None
            }
        })
    })
}
