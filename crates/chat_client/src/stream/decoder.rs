//! Frame decoder for the chat stream.
//!
//! Frames are separated by a blank line. Only lines starting with `data: `
//! carry payload. Input is buffered as bytes, so a chunk boundary may fall
//! anywhere, including inside a multi-byte character.

use std::collections::VecDeque;

use bytes::BytesMut;
use futures::stream::{self, Stream, StreamExt};

use super::event::StreamEvent;
use crate::error::ChatError;

const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    // Bytes already searched for a frame separator.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        // Raw carriage returns cannot appear inside a JSON payload.
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.next_separator() {
            let frame = self.buffer.split_to(end + 2);
            self.scanned = 0;
            events.extend(decode_frame(&frame[..end]));
        }
        self.scanned = self.buffer.len();
        events
    }

    /// Position of the next `\n\n`, resuming where the last search stopped.
    fn next_separator(&self) -> Option<usize> {
        // Back up one byte: the separator may straddle the previous chunk.
        let start = self.scanned.saturating_sub(1);
        self.buffer[start..]
            .windows(2)
            .position(|pair| pair == b"\n\n")
            .map(|offset| start + offset)
    }

    /// Decode whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.scanned = 0;
        let rest = self.buffer.split();
        decode_frame(&rest)
    }
}

fn decode_frame(frame: &[u8]) -> Option<StreamEvent> {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Dropping stream frame with invalid UTF-8: {e}");
            return None;
        }
    };

    let payload = text
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .collect::<Vec<_>>()
        .join("\n");
    if payload.trim().is_empty() {
        return None;
    }

    match StreamEvent::from_json(&payload) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("Dropping malformed stream frame: {e}");
            log::debug!("Malformed frame payload: {payload}");
            None
        }
    }
}

struct DecodeState<S> {
    chunks: S,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    closed: bool,
}

/// Turn a byte stream into stream events.
///
/// A transport error is yielded once as [`ChatError::Stream`] and ends the
/// stream. On a clean close any trailing unterminated frame is decoded.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<StreamEvent, ChatError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        chunks: Box::pin(chunks),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        closed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.closed {
                return None;
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.closed = true;
                    return Some((Err(ChatError::Stream(e.to_string())), state));
                }
                None => {
                    state.closed = true;
                    let trailing = state.decoder.finish();
                    state.pending.extend(trailing);
                }
            }
        }
    })
}
