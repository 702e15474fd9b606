//! Async adapters that drive a [`StreamDecoder`] from a response body.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use super::decoder::StreamDecoder;
use crate::error::ChatError;

/// Raw response body, chunked however the transport delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// Text deltas in arrival order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

struct DeltaState<S> {
    bytes: Pin<Box<S>>,
    decoder: StreamDecoder,
    pending: VecDeque<String>,
    exhausted: bool,
}

/// Turns a byte stream into a lazy stream of text deltas.
///
/// The byte source is polled only when every delta decoded so far has been
/// consumed, and never again after the `[DONE]` sentinel. A transport error
/// is yielded once and ends the stream; no flush happens in that case.
pub fn delta_stream<S>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, ChatError>> + Send + 'static,
{
    let state = DeltaState {
        bytes: Box::pin(bytes),
        decoder: StreamDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.exhausted || state.decoder.is_done() {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let deltas = state.decoder.feed(&chunk);
                    state.pending.extend(deltas);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.exhausted = true;
                    if !state.decoder.buffered().is_empty() {
                        log::trace!(
                            "flushing unterminated line: {:?}",
                            state.decoder.buffered()
                        );
                    }
                    let deltas = state.decoder.finish();
                    state.pending.extend(deltas);
                }
            }
        }
    }))
}

/// Decodes a whole response body, reporting through callbacks.
///
/// `on_delta` runs synchronously for every delta in arrival order and
/// `on_done` runs exactly once when the body is exhausted or the sentinel
/// arrives. A transport error is returned as-is and `on_done` is not called.
pub async fn decode_stream<S, D, F>(bytes: S, mut on_delta: D, on_done: F) -> Result<(), ChatError>
where
    S: Stream<Item = Result<Bytes, ChatError>> + Send + 'static,
    D: FnMut(&str),
    F: FnOnce(),
{
    let mut deltas = delta_stream(bytes);
    while let Some(delta) = deltas.next().await {
        on_delta(&delta?);
    }
    on_done();
    Ok(())
}
