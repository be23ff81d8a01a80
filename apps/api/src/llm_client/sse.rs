//! Incremental decoder for the Anthropic Messages server-sent event stream.
//!
//! Network chunks can split an event (or a UTF-8 sequence) anywhere, so bytes are
//! buffered until a blank line closes the frame.

use serde::Deserialize;

use super::LlmError;

/// One `event:`/`data:` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_frame(&raw[..end]) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(raw: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(raw);
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in text.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // comments (":") and unknown fields are ignored
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: StreamErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

/// What a frame means for the text stream.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamSignal {
    Text(String),
    Stop,
    Ignore,
}

/// Interprets one frame. `ping`, `message_start` and block boundaries are ignored.
pub fn interpret(frame: &SseFrame) -> Result<StreamSignal, LlmError> {
    if frame.data.is_empty() {
        return Ok(StreamSignal::Ignore);
    }
    let event: StreamEvent = serde_json::from_str(&frame.data)?;
    match event {
        StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => Ok(StreamSignal::Text(text)),
        StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => Ok(StreamSignal::Ignore),
        StreamEvent::MessageStop => Ok(StreamSignal::Stop),
        StreamEvent::Error { error } => Err(LlmError::Stream(error.message)),
    }
}
