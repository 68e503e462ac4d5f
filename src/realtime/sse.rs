use serde::Deserialize;
use serde_json::{Map, Value};

use super::RealtimeError;

/// One `event:`/`data:` block of a `text/event-stream` body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Largest event the decoder buffers before giving up on the stream.
pub const MAX_EVENT_BYTES: usize = 8 * 1024 * 1024;

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence;
/// only complete events are returned.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a blank line.
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and take every event it completes.
    ///
    /// Fails once a single event grows past [`MAX_EVENT_BYTES`]; the decoder
    /// should be dropped afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, RealtimeError> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        loop {
            // A separator may straddle the previous chunk boundary.
            let from = self.scanned.saturating_sub(1);
            let Some(end) = self.buf[from..]
                .windows(2)
                .position(|w| w == b"\n\n")
                .map(|pos| from + pos)
            else {
                self.scanned = self.buf.len();
                break;
            };

            let block: Vec<u8> = self.buf.drain(..end + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }

        if self.buf.len() > MAX_EVENT_BYTES {
            return Err(RealtimeError::Protocol(format!(
                "event larger than {MAX_EVENT_BYTES} bytes"
            )));
        }
        Ok(events)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event.event = value.to_owned(),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.event.is_empty() && data_lines.is_empty() {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// Realtime database stream events.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Map<String, Value> },
    KeepAlive,
    Cancel(String),
    AuthRevoked,
}

#[derive(Deserialize)]
struct PathData<T> {
    path: String,
    data: T,
}

impl TryFrom<&SseEvent> for StreamEvent {
    type Error = RealtimeError;

    fn try_from(ev: &SseEvent) -> Result<Self, Self::Error> {
        match ev.event.as_str() {
            "put" => {
                let body: PathData<Value> = serde_json::from_str(&ev.data)?;
                Ok(Self::Put { path: body.path, data: body.data })
            }
            "patch" => {
                let body: PathData<Map<String, Value>> = serde_json::from_str(&ev.data)?;
                Ok(Self::Patch { path: body.path, data: body.data })
            }
            "keep-alive" => Ok(Self::KeepAlive),
            "cancel" => Ok(Self::Cancel(ev.data.clone())),
            "auth_revoked" => Ok(Self::AuthRevoked),
            other => Err(RealtimeError::Protocol(format!("unexpected event {other:?}"))),
        }
    }
}
