//! Event stream consumer: chunked transport bytes → typed turn events.
//!
//! The parser buffers partial lines across chunk boundaries (bytes, not
//! lossy strings, so UTF-8 split across chunks survives), splits on line
//! boundaries, and decodes each complete line through [`wire`]. Malformed
//! lines are logged and skipped; they never abort a turn. A top-level
//! `error` field aborts immediately.

pub mod wire;

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use weft_types::event::TurnEvent;

use self::wire::{WireRecord, decode_line};

/// Default cap on a single buffered line, from `StreamConfig`.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Categories of stream errors for consistent handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Malformed record; recovered locally, never fatal.
    Protocol,
    /// Transport failure or server-side abort; fatal to the turn.
    Transport,
    /// Stream completed with zero rendered content; fatal to the turn.
    NoContent,
    /// Cooperative cancellation; the reader is released first.
    Cancelled,
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErrorKind::Protocol => write!(f, "protocol"),
            StreamErrorKind::Transport => write!(f, "transport"),
            StreamErrorKind::NoContent => write!(f, "no_content"),
            StreamErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Structured error surfaced by the consumer and the turn runner.
#[derive(Debug, Clone)]
pub struct StreamError {
    /// Error category.
    pub kind: StreamErrorKind,
    /// One-line summary suitable for display.
    pub message: String,
    /// Optional additional details (e.g. the offending payload).
    pub details: Option<String>,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates a protocol error (malformed record, recovered locally).
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Protocol, message)
    }

    /// Creates a transport error (network failure or server abort).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, message)
    }

    /// Creates the zero-content completion error.
    pub fn no_content() -> Self {
        Self::new(
            StreamErrorKind::NoContent,
            "stream completed without producing any content",
        )
    }

    /// Creates the cooperative-cancellation error.
    pub fn cancelled() -> Self {
        Self::new(StreamErrorKind::Cancelled, "turn cancelled")
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StreamError {}

/// Result type for stream operations.
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Converts a chunked byte source into a stream of turn events.
///
/// Stops after the first terminal event (`done`, `error`, or a top-level
/// abort); anything still buffered past it is dropped.
pub struct EventStreamParser<S> {
    inner: S,
    buf: Vec<u8>,
    pending: VecDeque<TurnEvent>,
    max_line_bytes: usize,
    /// Set after an oversize line was dropped; the remainder of that line
    /// is discarded up to its newline.
    discard_overflow: bool,
    finished: bool,
}

impl<S> EventStreamParser<S> {
    pub fn new(inner: S) -> Self {
        Self::with_max_line_bytes(inner, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(inner: S, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pending: VecDeque::new(),
            max_line_bytes: max_line_bytes.max(1),
            discard_overflow: false,
            finished: false,
        }
    }

    fn ingest(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if self.discard_overflow {
                self.discard_overflow = false;
                continue;
            }
            self.handle_line(&line[..line.len() - 1]);
            if self.finished {
                self.buf.clear();
                return;
            }
        }

        if self.buf.len() > self.max_line_bytes {
            tracing::warn!(
                bytes = self.buf.len(),
                "dropping oversize stream line without newline"
            );
            self.buf.clear();
            self.discard_overflow = true;
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let Ok(text) = std::str::from_utf8(line) else {
            tracing::warn!("skipping stream line with invalid UTF-8");
            return;
        };

        match decode_line(text) {
            Ok(WireRecord::Empty) => {}
            Ok(WireRecord::Event(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                self.pending.push_back(event);
            }
            Ok(WireRecord::Abort { message }) => {
                self.finished = true;
                self.pending.push_back(TurnEvent::Error { message });
            }
            Err(err) => {
                tracing::warn!(line = text, reason = %err, "skipping malformed stream record");
            }
        }
    }

    /// Decodes a trailing partial line left at end of stream.
    fn flush_trailing(&mut self) {
        if self.buf.is_empty() || self.discard_overflow {
            self.buf.clear();
            return;
        }
        let line = std::mem::take(&mut self.buf);
        self.handle_line(&line);
    }
}

impl<S, E> Stream for EventStreamParser<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = StreamResult<TurnEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.ingest(&chunk),
                Poll::Ready(Some(Err(err))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(StreamError::transport(err.to_string()))));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    self.flush_trailing();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    /// Helper to create a mock byte stream delivered in small chunks.
    fn mock_byte_stream(
        data: &str,
        chunk_size: usize,
    ) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    async fn collect_events<S>(mut parser: EventStreamParser<S>) -> Vec<StreamResult<TurnEvent>>
    where
        S: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin,
    {
        let mut events = Vec::new();
        while let Some(item) = parser.next().await {
            events.push(item);
        }
        events
    }

    const WIRE_FIXTURE: &str = "data: {\"type\":\"stream_started\"}\n\
data: {\"type\":\"content\",\"text\":\"Hello \"}\n\
data: {\"type\":\"content\",\"text\":\"world\"}\n\
data: {\"type\":\"done\",\"ephemeral\":false}\n";

    #[tokio::test]
    async fn test_parses_records_split_across_chunks() {
        // 7-byte chunks guarantee every line straddles a boundary.
        let parser = EventStreamParser::new(mock_byte_stream(WIRE_FIXTURE, 7));
        let events: Vec<_> = collect_events(parser)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                TurnEvent::StreamStarted,
                TurnEvent::Content {
                    text: "Hello ".to_string()
                },
                TurnEvent::Content {
                    text: "world".to_string()
                },
                TurnEvent::Done { ephemeral: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_utf8_split_across_chunks_survives() {
        // 👋 = F0 9F 91 8B; a 3-byte chunk size splits it mid-character.
        let data = "data: {\"type\":\"content\",\"text\":\"Hi 👋\"}\n";
        let parser = EventStreamParser::new(mock_byte_stream(data, 3));
        let events = collect_events(parser).await;

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &TurnEvent::Content {
                text: "Hi 👋".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped_not_fatal() {
        let data = "data: {\"type\":\"content\",\"text\":\"a\"}\n\
garbage without prefix\n\
data: {broken json\n\
data: {\"type\":\"content\",\"text\":\"b\"}\n";
        let parser = EventStreamParser::new(mock_byte_stream(data, 11));
        let events: Vec<_> = collect_events(parser)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                TurnEvent::Content {
                    text: "a".to_string()
                },
                TurnEvent::Content {
                    text: "b".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_top_level_error_aborts_and_drops_the_rest() {
        let data = "data: {\"type\":\"content\",\"text\":\"a\"}\n\
data: {\"error\":\"overloaded\"}\n\
data: {\"type\":\"content\",\"text\":\"never seen\"}\n";
        let parser = EventStreamParser::new(mock_byte_stream(data, 9));
        let events: Vec<_> = collect_events(parser)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                TurnEvent::Content {
                    text: "a".to_string()
                },
                TurnEvent::Error {
                    message: "overloaded".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_as_stream_error() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"text\":\"a\"}\n")),
            Err(std::io::Error::other("connection reset")),
        ];
        let parser = EventStreamParser::new(futures_util::stream::iter(chunks));
        let events = collect_events(parser).await;

        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        let err = events[1].as_ref().unwrap_err();
        assert_eq!(err.kind, StreamErrorKind::Transport);
        assert!(err.message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline_is_decoded() {
        let data = "data: {\"type\":\"content\",\"text\":\"a\"}\ndata: {\"type\":\"done\"}";
        let parser = EventStreamParser::new(mock_byte_stream(data, 13));
        let events: Vec<_> = collect_events(parser)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(events.last(), Some(&TurnEvent::Done { ephemeral: false }));
    }

    #[tokio::test]
    async fn test_oversize_line_is_dropped_whole() {
        let huge = format!(
            "data: {{\"type\":\"content\",\"text\":\"{}\"}}\ndata: {{\"type\":\"content\",\"text\":\"ok\"}}\n",
            "x".repeat(64)
        );
        let parser =
            EventStreamParser::with_max_line_bytes(mock_byte_stream(&huge, 16), 32);
        let events: Vec<_> = collect_events(parser)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        // The oversize record is gone; the following record is intact.
        assert_eq!(
            events,
            vec![TurnEvent::Content {
                text: "ok".to_string()
            }]
        );
    }
}
