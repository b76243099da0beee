//! Incremental decoder for OpenAI-style `data:` event lines.
//!
//! Network reads split lines (and multi-byte characters) at arbitrary points,
//! so bytes are buffered until a newline arrives. Only complete lines are
//! decoded.

use serde::Deserialize;
use tracing::trace;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// A decoded upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A non-empty fragment of generated text.
    Delta(String),
    /// Explicit end-of-stream marker.
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Line-buffering frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every frame completed by it.
    /// A trailing partial line is held back for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = decode_line(&line[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is buffered once the upstream body has ended.
    ///
    /// A final line without a trailing newline is still a complete line at
    /// end-of-stream; a cut-off JSON payload simply fails to decode.
    pub fn finish(&mut self) -> Vec<Frame> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line).into_iter().collect()
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<Frame> {
    let Ok(line) = std::str::from_utf8(line) else {
        trace!("Skipping non UTF-8 event line");
        return None;
    };
    let line = line.strip_suffix('\r').unwrap_or(line);
    let data = line.strip_prefix(DATA_PREFIX)?.trim();

    if data == DONE_MARKER {
        return Some(Frame::Done);
    }

    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(Frame::Delta),
        Err(err) => {
            trace!(error = %err, "Skipping malformed event line");
            None
        }
    }
}
