//! Frame decoding for the streamed job body
//!
//! The backend writes frames separated by a blank line. Chunks arrive in
//! arbitrary sizes, so the decoder keeps one growing byte buffer and only ever
//! emits frames whose closing delimiter has been observed. Splitting happens on
//! raw bytes, which means a multi-byte UTF-8 character split across two chunks
//! is reassembled before the frame is turned into text.

/// One delimiter-bounded unit of the stream, not yet parsed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame(String);

impl RawFrame {
    /// Frame text without the trailing delimiter
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the frame, returning its text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for RawFrame {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Incremental blank-line frame decoder
///
/// A decoder belongs to a single stream; create a new one per job.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position from which the next delimiter search starts
    scan_from: usize,
    max_frame_bytes: usize,
    /// Set after an oversized remainder was dropped; bytes are skipped until
    /// the next delimiter so the tail of that frame is not misread.
    skipping: bool,
    dropped_frames: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default 1 MiB frame limit
    pub fn new() -> Self {
        Self::with_max_frame_bytes(1024 * 1024)
    }

    /// Create a decoder that drops undelimited remainders larger than `max_frame_bytes`
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scan_from: 0,
            max_frame_bytes: max_frame_bytes.max(2),
            skipping: false,
            dropped_frames: 0,
        }
    }

    /// Append one received chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, if a full delimiter has been buffered
    ///
    /// Frames that are empty or whitespace-only (e.g. keep-alive blank lines)
    /// are skipped.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            let Some((frame_end, next_start)) = find_delimiter(&self.buffer, self.scan_from)
            else {
                self.scan_from = self.buffer.len().saturating_sub(2);
                if self.buffer.len() > self.max_frame_bytes {
                    tracing::warn!(
                        buffered = self.buffer.len(),
                        limit = self.max_frame_bytes,
                        "discarding oversized frame"
                    );
                    // A delimiter may have started in the dropped bytes
                    let keep = delimiter_prefix_len(&self.buffer);
                    self.buffer.drain(..self.buffer.len() - keep);
                    self.scan_from = 0;
                    self.skipping = true;
                    self.dropped_frames += 1;
                }
                return None;
            };

            let rest = self.buffer.split_off(next_start);
            let mut bytes = std::mem::replace(&mut self.buffer, rest);
            bytes.truncate(frame_end);
            self.scan_from = 0;

            if std::mem::take(&mut self.skipping) {
                continue;
            }

            let text = String::from_utf8_lossy(&bytes);
            let text = text.trim_end_matches('\r');
            if text.trim().is_empty() {
                continue;
            }
            return Some(RawFrame(text.to_string()));
        }
    }

    /// Iterate over the frames currently available
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Number of oversized frames discarded so far
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// End of stream: discard any incomplete remainder, returning its size
    ///
    /// A truncated trailing frame is unusable; losing it is expected, not an
    /// error.
    pub fn finish(self) -> usize {
        if self.skipping {
            return 0;
        }
        let remainder = self.buffer.len();
        if remainder > 0 && !self.buffer.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(bytes = remainder, "discarding truncated trailing frame");
            return remainder;
        }
        0
    }
}

/// Iterator over the frames a [`FrameDecoder`] can produce right now
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = RawFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}

/// Length of a trailing `\n` or `\n\r` that the next chunk could complete
fn delimiter_prefix_len(buf: &[u8]) -> usize {
    if buf.ends_with(b"\n") {
        1
    } else if buf.ends_with(b"\n\r") {
        2
    } else {
        0
    }
}

/// Find the first blank-line delimiter at or after `from`.
///
/// Accepts `\n\n` and `\n\r\n` (which covers `\r\n\r\n`). Returns the frame
/// end and the start of the next frame.
fn find_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match (buf.get(i + 1), buf.get(i + 2)) {
                (Some(b'\n'), _) => return Some((i, i + 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}
