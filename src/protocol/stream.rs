/// Pull-based adapter from a raw HTTP body stream to decoded protocol events.
use futures_util::Stream;
use smallvec::SmallVec;

use crate::error::ChatError;

use super::{FrameDecoder, StreamEvent};

struct PendingEvents {
    events: SmallVec<[StreamEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn new() -> Self {
        Self {
            events: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<StreamEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<StreamEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }
}

/// Split a byte stream into decoded [`StreamEvent`]s using [`FrameDecoder`].
///
/// Bytes arriving from an HTTP response body are decoded as UTF-8 (sequences
/// split across chunk boundaries are buffered), fed into the decoder, and
/// complete events are yielded lazily. Reading from the underlying stream
/// stops as soon as the decoder emits a terminal event, or at end-of-data,
/// whichever comes first. A transport error from the byte stream is yielded
/// once as `Err` and ends the sequence.
pub fn event_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<StreamEvent, ChatError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    struct State<S> {
        stream: std::pin::Pin<Box<S>>,
        decoder: FrameDecoder,
        remainder: Vec<u8>,
        parsed: Vec<StreamEvent>,
        pending: PendingEvents,
        done: bool,
    }

    let state = State {
        stream: Box::pin(byte_stream),
        decoder: FrameDecoder::new(),
        remainder: Vec::new(),
        parsed: Vec::with_capacity(8),
        pending: PendingEvents::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }

            match state.stream.as_mut().next().await {
                None => return None,
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(ChatError::Transport(err.to_string())), state));
                }
                Some(Ok(bytes)) => {
                    feed_chunk(
                        &mut state.decoder,
                        &mut state.remainder,
                        &bytes,
                        &mut state.parsed,
                    );
                    if state.decoder.is_terminated() {
                        // Early read cancellation: no further pulls from the
                        // underlying stream once pending events drain.
                        state.done = true;
                    }
                    state.pending.extend_from_vec(&mut state.parsed);
                }
            }
        }
    })
}

/// Feed one byte chunk into the decoder, carrying partial UTF-8 sequences
/// across chunk boundaries in `remainder`.
fn feed_chunk(
    decoder: &mut FrameDecoder,
    remainder: &mut Vec<u8>,
    bytes: &[u8],
    parsed: &mut Vec<StreamEvent>,
) {
    if remainder.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(text) => decoder.feed_into(text, parsed),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                let text = unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) };
                decoder.feed_into(text, parsed);
                remainder.extend_from_slice(&bytes[valid_up_to..]);
            }
        }
        return;
    }

    remainder.extend_from_slice(bytes);
    match std::str::from_utf8(remainder.as_slice()) {
        Ok(text) => {
            decoder.feed_into(text, parsed);
            remainder.clear();
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
            let text = unsafe { std::str::from_utf8_unchecked(&remainder[..valid_up_to]) };
            decoder.feed_into(text, parsed);
            if valid_up_to > 0 {
                if valid_up_to == remainder.len() {
                    remainder.clear();
                } else {
                    let remain_len = remainder.len() - valid_up_to;
                    remainder.copy_within(valid_up_to.., 0);
                    remainder.truncate(remain_len);
                }
            }
        }
    }
}
