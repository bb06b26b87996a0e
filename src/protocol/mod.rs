//! Streamed job-progress protocol
//!
//! - [`frame`] - splits the raw body into blank-line delimited frames
//! - [`event`] - turns each frame's `data:` payload into a [`ProtocolEvent`]
//!
//! [`EventDecoder`] chains the two for the read loop.

pub mod event;
pub mod frame;

pub use event::{ProtocolEvent, classify};
pub use frame::{FrameDecoder, RawFrame};

use crate::error::FrameError;

/// A frame that could not be classified
#[derive(Debug)]
pub struct DroppedFrame {
    /// The offending frame
    pub frame: RawFrame,
    /// Why it was dropped
    pub error: FrameError,
}

/// Bytes in, classified events out
#[derive(Debug, Default)]
pub struct EventDecoder {
    frames: FrameDecoder,
}

impl EventDecoder {
    /// Create a decoder with the given frame size limit
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            frames: FrameDecoder::with_max_frame_bytes(max_frame_bytes),
        }
    }

    /// Append one received chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.frames.push(chunk);
    }

    /// Next classified event (or dropped frame) in stream order
    pub fn next_event(&mut self) -> Option<Result<ProtocolEvent, DroppedFrame>> {
        let frame = self.frames.next_frame()?;
        Some(classify(&frame).map_err(|error| DroppedFrame { frame, error }))
    }

    /// Oversized frames discarded so far
    pub fn dropped_frames(&self) -> u64 {
        self.frames.dropped_frames()
    }

    /// End of stream, returning the number of discarded trailing bytes
    pub fn finish(self) -> usize {
        self.frames.finish()
    }
}
