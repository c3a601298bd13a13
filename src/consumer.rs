//! Incremental consumption of a stream session.
//!
//! Drives a [`TextStream`](crate::session::TextStream) to completion, keeps
//! the running response, and reports the whole response so far after every
//! increment. Callers replace what they display with each update rather than
//! appending to it.

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::client::ClientError;

/// Text handed to the update callback when the stream fails.
pub const ERROR_INDICATOR: &str = "Error: Failed to get AI response";

/// Running response text for one stream session. Append-only.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    text: String,
    increments: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an increment and return the full response so far.
    pub fn push(&mut self, increment: &str) -> &str {
        self.text.push_str(increment);
        self.increments += 1;
        &self.text
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of increments appended.
    pub fn increments(&self) -> usize {
        self.increments
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Consume a stream of increments, calling `on_update` once per increment
/// with the accumulated text.
///
/// Returns the final text when the stream ends (terminal sentinel, end of
/// body, or cancellation). On error, `on_update` receives [`ERROR_INDICATOR`]
/// exactly once and the error is returned.
pub async fn consume_stream<S, F>(stream: S, mut on_update: F) -> Result<String, ClientError>
where
    S: Stream<Item = Result<String, ClientError>>,
    F: FnMut(&str),
{
    futures::pin_mut!(stream);
    let mut response = Accumulator::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(increment) => on_update(response.push(&increment)),
            Err(e) => {
                warn!(
                    error = %e,
                    increments = response.increments(),
                    "stream failed mid-response"
                );
                on_update(ERROR_INDICATOR);
                return Err(e);
            }
        }
    }

    debug!(
        increments = response.increments(),
        chars = response.as_str().chars().count(),
        "stream consumed"
    );
    Ok(response.into_string())
}
