//! SSE framing for the event stream.
//!
//! The server encodes each event as one frame, `data: <JSON>\n\n`, and
//! forwards it immediately. The client decodes the byte stream
//! incrementally: frames may arrive split across read chunks (including
//! mid-UTF-8-sequence), so complete frames are cut from a byte buffer
//! before any text decoding happens. Malformed frames and partial
//! trailing data are dropped silently. This layer performs no domain
//! logic.

use tracing::debug;

use crate::error::Result;
use crate::protocol::AgentEvent;

/// Encode one event as an SSE frame.
pub fn encode_frame(event: &AgentEvent) -> Result<String> {
    let json = serde_json::to_string(event)?;
    Ok(format!("data: {json}\n\n"))
}

/// Incremental frame decoder for the client side of the stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read chunk, returning every event it completed. A partial
    /// trailing frame stays buffered until the next chunk; whatever is
    /// left when the decoder is dropped is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<AgentEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, sep)) = frame_boundary(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..end + sep).collect();
            if let Some(event) = parse_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }
}

/// Find the blank line ending the first complete frame. Returns the frame
/// length and the separator length (`\n\n` or `\n\r\n`).
fn frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    for (i, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        match buf.get(i + 1) {
            Some(b'\n') => return Some((i, 2)),
            Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some((i, 3)),
            _ => {}
        }
    }
    None
}

/// Parse one frame's bytes into an event. Anything malformed — invalid
/// UTF-8, no `data:` field, undecodable JSON — yields `None`.
fn parse_frame(bytes: &[u8]) -> Option<AgentEvent> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        debug!("Dropping frame with invalid UTF-8");
        return None;
    };

    let mut data: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // Other SSE fields (event:, id:, retry:) carry nothing we use.
    }

    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(&data.join("\n")) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(%e, "Dropping malformed frame");
            None
        }
    }
}
