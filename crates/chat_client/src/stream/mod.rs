//! Decoding of the chat stream (`text/event-stream`).

pub mod decoder;
pub mod event;

pub use decoder::{decode_stream, FrameDecoder};
pub use event::{StreamEvent, StreamMetadata};
