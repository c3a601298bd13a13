//! Stream session lifecycle.
//!
//! A [`StreamController`] owns at most one live session at a time. Each
//! session gets its own [`CancellationToken`]; the returned [`TextStream`]
//! stops yielding as soon as that token is cancelled and drops the transport
//! on every exit path (terminal sentinel, end of body, read error,
//! cancellation, or the caller dropping the stream).

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::RequestBuilder;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::http::status_text;
use crate::model::StreamEvent;
use crate::sse::{decode_stream, SSEResponseExt};

/// Lazy sequence of text increments for one stream session.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

struct ActiveSession {
    id: u64,
    token: CancellationToken,
}

/// Owns the connection lifecycle for stream sessions.
///
/// Opening while another session is live and uncancelled fails with
/// [`ClientError::SessionBusy`]. A cancelled session no longer blocks a new
/// open, even if its stream has not been dropped yet.
#[derive(Default)]
pub struct StreamController {
    active: Arc<Mutex<Option<ActiveSession>>>,
    next_id: AtomicU64,
}

impl StreamController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the handshake request and return the session's increments.
    ///
    /// A transport failure or non-success status fails with
    /// [`ClientError::Connection`] before any event is produced. Cancelling during the handshake yields an empty stream.
    pub async fn open(&self, request: RequestBuilder) -> Result<TextStream, ClientError> {
        let handle = self.begin()?;

        let response = tokio::select! {
            biased;
            _ = handle.token.cancelled() => {
                debug!(session = handle.id, "stream session cancelled during handshake");
                return Ok(Box::pin(stream::empty::<Result<String, ClientError>>()));
            }
            response = request.send() => match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(session = handle.id, error = %e, "stream handshake failed");
                    return Err(ClientError::Connection {
                        status: 0,
                        reason: e.to_string(),
                    });
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            let reason = status_text(status);
            warn!(session = handle.id, status = status.as_u16(), %reason, "stream handshake rejected");
            return Err(ClientError::Connection {
                status: status.as_u16(),
                reason,
            });
        }

        info!(session = handle.id, "stream session opened");
        Ok(text_stream(handle, response.sse()))
    }

    /// Start a session over an already established byte stream.
    pub fn attach<S, E>(&self, bytes: S) -> Result<TextStream, ClientError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let handle = self.begin()?;
        debug!(session = handle.id, "stream session attached");
        Ok(text_stream(handle, decode_stream(bytes)))
    }

    /// Cancel the current session. No-op when nothing is active; idempotent.
    pub fn cancel(&self) {
        if let Some(active) = self.active.lock().as_ref() {
            if !active.token.is_cancelled() {
                info!(session = active.id, "cancelling stream session");
                active.token.cancel();
            }
        }
    }

    /// Whether a live, uncancelled session exists.
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| !active.token.is_cancelled())
    }

    fn begin(&self) -> Result<SessionHandle, ClientError> {
        let mut slot = self.active.lock();
        if slot.as_ref().is_some_and(|active| !active.token.is_cancelled()) {
            return Err(ClientError::SessionBusy);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        *slot = Some(ActiveSession {
            id,
            token: token.clone(),
        });

        Ok(SessionHandle {
            id,
            token,
            slot: Arc::clone(&self.active),
        })
    }
}

/// Session-scoped ownership of the token; releases the controller slot on drop.
struct SessionHandle {
    id: u64,
    token: CancellationToken,
    slot: Arc<Mutex<Option<ActiveSession>>>,
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.token.cancel();
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|active| active.id == self.id) {
            *slot = None;
        }
        debug!(session = self.id, "stream session released");
    }
}

fn text_stream<S>(handle: SessionHandle, events: S) -> TextStream
where
    S: Stream<Item = Result<StreamEvent, ClientError>> + Send + 'static,
{
    let state = Some((handle, Box::pin(events)));

    Box::pin(stream::unfold(state, |state| async move {
        let (handle, mut events) = state?;

        let next = tokio::select! {
            biased;
            _ = handle.token.cancelled() => {
                debug!(session = handle.id, "stream session stopped by cancellation");
                None
            }
            event = events.next() => event,
        };

        match next {
            Some(Ok(StreamEvent::Data(text))) => Some((Ok(text), Some((handle, events)))),
            Some(Ok(StreamEvent::Terminal)) => {
                info!(session = handle.id, "stream session completed");
                None
            }
            Some(Err(e)) => {
                warn!(session = handle.id, error = %e, "stream session failed");
                Some((Err(e), None))
            }
            None => None,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::io;

    type ByteSender = mpsc::UnboundedSender<Result<Bytes, io::Error>>;

    fn channel() -> (ByteSender, mpsc::UnboundedReceiver<Result<Bytes, io::Error>>) {
        mpsc::unbounded()
    }

    fn send(tx: &ByteSender, s: &'static str) {
        tx.unbounded_send(Ok(Bytes::from_static(s.as_bytes()))).unwrap();
    }

    #[tokio::test]
    async fn test_yields_increments_until_terminal() {
        let controller = StreamController::new();
        let (tx, rx) = channel();
        let mut stream = controller.attach(rx).unwrap();

        send(&tx, "data:a\ndata:b\\nc\n");
        send(&tx, "data:[DONE]\ndata:ignored\n");

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert_eq!(stream.next().await.unwrap().unwrap(), "b\nc");
        assert!(stream.next().await.is_none());
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_cancel_stops_further_increments() {
        let controller = StreamController::new();
        let (tx, rx) = channel();
        let mut stream = controller.attach(rx).unwrap();

        send(&tx, "data:one\ndata:two\n");
        assert_eq!(stream.next().await.unwrap().unwrap(), "one");
        assert_eq!(stream.next().await.unwrap().unwrap(), "two");

        controller.cancel();
        send(&tx, "data:three\n");
        assert!(stream.next().await.is_none());
        assert!(!controller.is_active());

        // Once the stream has unwound the transport receiver is gone.
        assert!(tx.unbounded_send(Ok(Bytes::new())).is_err());
    }

    #[tokio::test]
    async fn test_cancel_without_session_is_noop() {
        let controller = StreamController::new();
        controller.cancel();
        controller.cancel();
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_second_open_is_rejected_while_active() {
        let controller = StreamController::new();
        let (_tx, rx) = channel();
        let _first = controller.attach(rx).unwrap();

        let (_tx2, rx2) = channel();
        assert!(matches!(controller.attach(rx2), Err(ClientError::SessionBusy)));
    }

    #[tokio::test]
    async fn test_cancelled_session_does_not_affect_next_one() {
        let controller = StreamController::new();
        let (_tx1, rx1) = channel();
        let first = controller.attach(rx1).unwrap();
        controller.cancel();

        let (tx2, rx2) = channel();
        let mut second = controller.attach(rx2).unwrap();
        drop(first);
        assert!(controller.is_active());

        send(&tx2, "data:fresh\n");
        assert_eq!(second.next().await.unwrap().unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_read_error_keeps_prior_increments() {
        let controller = StreamController::new();
        let (tx, rx) = channel();
        let stream = controller.attach(rx).unwrap();

        send(&tx, "data:kept\n");
        tx.unbounded_send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
            .unwrap();

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "kept");
        assert!(matches!(items[1], Err(ClientError::StreamRead(_))));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_session() {
        let controller = StreamController::new();
        let (_tx, rx) = channel();
        let stream = controller.attach(rx).unwrap();
        assert!(controller.is_active());
        drop(stream);
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_open_rejected_handshake() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let controller = StreamController::new();
        let request = reqwest::Client::new().get(format!("{}/stream", server.uri()));
        match controller.open(request).await {
            Err(ClientError::Connection { status, reason }) => {
                assert_eq!(status, 503);
                assert_eq!(reason, "Service Unavailable");
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_open_unreachable_server() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let controller = StreamController::new();
        let request = reqwest::Client::new().get(format!("http://{}/stream", addr));
        match controller.open(request).await {
            Err(ClientError::Connection { status, reason }) => {
                assert_eq!(status, 0);
                assert!(!reason.is_empty());
            }
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
        assert!(!controller.is_active());
    }
}
