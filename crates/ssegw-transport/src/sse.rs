//! # SSE Decoder
//!
//! Decodes a `text/event-stream` byte stream into named frames:
//! - Line buffering from chunked responses (`\n`, `\r\n`)
//! - `event:` / `data:` / `id:` / `retry:` fields, `:` comments
//! - Multi-line `data:` joined with `\n`
//! - A blank line dispatches the frame being built

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

/// Frame name used when the server sends no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name (`open`, `configure`, `reload`, or a channel name).
    pub event: String,
    /// Payload, possibly empty.
    pub data: String,
    /// Last event id, if the server sets one.
    pub id: Option<String>,
}

impl SseFrame {
    /// Build a frame by hand (tests and in-process transports).
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

/// Decoder output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// A complete frame.
    Frame(SseFrame),
    /// A `retry:` reconnect hint in milliseconds.
    Retry(u64),
}

/// Line-level decoder state.
#[derive(Debug, Default)]
struct FrameBuilder {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl FrameBuilder {
    /// Feed one line (without its terminator).
    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            "retry" => return value.trim().parse().ok().map(SseEvent::Retry),
            _ => {}
        }
        None
    }

    /// Emit the frame being built. Blocks with neither a name nor data are dropped.
    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        let id = self.id.take();
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseEvent::Frame(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_owned()),
            data: data.join("\n"),
            id,
        }))
    }
}

/// Decode SSE frames from a byte stream.
///
/// The stream ends when the byte stream ends or yields an error; an
/// unterminated trailing frame is discarded.
pub fn parse_sse_events<S, E>(byte_stream: S) -> impl Stream<Item = SseEvent> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), FrameBuilder::default()),
        |(mut stream, mut buffer, mut builder)| async move {
            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue; // skip invalid UTF-8 lines
                    };

                    if let Some(event) = builder.feed_line(line) {
                        return Some((event, (stream, buffer, builder)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        return None;
                    }
                    None => return None,
                }
            }
        },
    )
}
