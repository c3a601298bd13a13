//! Server-Sent Events (SSE) stream decoding.
//!
//! Turns a raw byte stream into [`StreamEvent`]s. Bytes may arrive at any
//! granularity; a line is only interpreted once its terminating line feed has
//! been seen, so neither events nor the terminal sentinel depend on how the
//! transport happened to chunk them.
//!
//! Wire format:
//! ```text
//! data:Hello
//! data: world\nsecond line
//! data:[DONE]
//! ```
//!
//! Payloads carry newlines escaped as the two characters `\` `n`; they are
//! restored before the event is emitted.

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, UTF_8};
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, trace};

use crate::client::ClientError;
use crate::model::StreamEvent;

/// Prefix that marks a line as carrying an event payload.
pub const DATA_MARKER: &str = "data:";

/// Payload signalling an intentional end of stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Incremental line decoder for one stream session.
///
/// Holds the streaming UTF-8 decoder state and at most one unterminated line.
/// Once the terminal sentinel has been seen, further input is ignored.
pub struct SseDecoder {
    decoder: Decoder,
    buffer: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder_with_bom_removal(),
            buffer: String::new(),
            finished: false,
        }
    }

    /// Whether the terminal sentinel has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The unterminated tail carried over to the next chunk.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Feed one raw chunk and return the events completed by it.
    ///
    /// If the chunk completes the terminal sentinel, `Terminal` is the last
    /// event returned and the decoder stops accepting input.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.decode_chunk(chunk, false);
        self.drain_complete_lines()
    }

    /// Signal end of transport.
    ///
    /// An unterminated trailing line is discarded: only line-feed terminated
    /// lines are ever interpreted.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.decode_chunk(&[], true);
        if !self.buffer.is_empty() {
            debug!(len = self.buffer.len(), "discarding unterminated line at end of stream");
        }
        self.buffer.clear();
        self.finished = true;
    }

    fn decode_chunk(&mut self, chunk: &[u8], last: bool) {
        let mut input = chunk;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len() * 3 + 4);
            self.buffer.reserve(needed);

            let (result, read, replaced) = self.decoder.decode_to_string(input, &mut self.buffer, last);
            if replaced {
                trace!("replaced malformed UTF-8 in stream chunk");
            }
            input = &input[read..];

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<StreamEvent> {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        let mut events = Vec::new();
        // `complete` ends with '\n', so the final split element is always empty.
        for line in complete[..last_newline].split('\n') {
            match decode_line(line) {
                Some(StreamEvent::Terminal) => {
                    trace!("terminal sentinel received");
                    events.push(StreamEvent::Terminal);
                    self.finished = true;
                    self.buffer.clear();
                    break;
                }
                Some(event) => events.push(event),
                None => {}
            }
        }
        events
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an SSE line to extract the data portion.
///
/// Only the marker itself is stripped; whitespace after it belongs to the
/// payload.
///
/// # Example
/// ```
/// use codehelper::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: hello"), Some(" hello"));
/// assert_eq!(parse_sse_line("data:hello"), Some("hello"));
/// assert_eq!(parse_sse_line("event: ping"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_MARKER)
}

/// Check if an SSE payload is the end-of-stream sentinel.
///
/// # Example
/// ```
/// use codehelper::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(" [DONE]"));
/// assert!(!is_done_marker(""));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_MARKER
}

/// Restore newlines that were escaped as literal `\n` for single-line transmission.
pub fn unescape_newlines(payload: &str) -> String {
    payload.replace("\\n", "\n")
}

/// Interpret one complete line.
///
/// Returns `None` for lines without the data marker and for empty or `null`
/// keep-alive payloads.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = parse_sse_line(line) else {
        if !line.is_empty() {
            trace!(line, "ignoring line without data marker");
        }
        return None;
    };

    if is_done_marker(payload) {
        return Some(StreamEvent::Terminal);
    }
    if payload.is_empty() || payload == "null" {
        return None;
    }
    Some(StreamEvent::Data(unescape_newlines(payload)))
}

struct DecodeState<S> {
    bytes: Option<Pin<Box<S>>>,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
}

/// Decode a byte stream into a lazy stream of events.
///
/// The sequence ends after `Terminal`, at end of transport, or right after a
/// `StreamRead` error. The underlying byte stream is dropped as soon as no
/// more bytes will be read from it.
pub fn decode_stream<S, E>(bytes: S) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = DecodeState {
        bytes: Some(Box::pin(bytes)),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }

            let byte_stream = state.bytes.as_mut()?;
            match byte_stream.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.decoder.feed(&chunk));
                    if state.decoder.is_finished() {
                        state.bytes = None;
                    }
                }
                Some(Err(e)) => {
                    state.bytes = None;
                    return Some((Err(ClientError::StreamRead(Box::new(e))), state));
                }
                None => {
                    state.decoder.finish();
                    state.bytes = None;
                }
            }
        }
    })
}

/// Extension trait for `reqwest::Response` to enable SSE decoding.
///
/// # Example
/// ```ignore
/// use codehelper::sse::SSEResponseExt;
///
/// let response = client.get("http://localhost:8081/api/ai/chat/stream").send().await?;
/// let mut events = Box::pin(response.sse());
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// ```
pub trait SSEResponseExt {
    /// Convert the response body into a stream of decoded events.
    fn sse(self) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send {
        decode_stream(self.bytes_stream())
    }
}
