//! Core client traits and error types.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::model::{KnowledgeBaseResult, LearningReport, StreamRequest};
use crate::session::TextStream;
use crate::storage::StorageError;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The stream handshake failed. No events were produced.
    ///
    /// `status` is 0 when the server could not be reached at all.
    #[error("Stream API error: {reason}")]
    Connection { status: u16, reason: String },

    /// Reading an established stream failed. Increments already delivered stay valid.
    #[error("Stream read error: {0}")]
    StreamRead(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A request/response call returned a non-success status.
    #[error("{operation} API error: {status_text}")]
    Operation {
        operation: Operation,
        status_text: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("A stream session is already active")]
    SessionBusy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The non-streaming operations, used to tag `ClientError::Operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Chat,
    LearningReport,
    KnowledgeBase,
    HealthCheck,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Chat => "Chat",
            Operation::LearningReport => "Learning Report",
            Operation::KnowledgeBase => "Knowledge Base",
            Operation::HealthCheck => "Health check",
        })
    }
}

/// Request/response operations offered by the assistant service.
///
/// Every method is stateless: it serializes the request, issues it, and maps a
/// non-success status to [`ClientError::Operation`] carrying the status text.
/// Nothing is retried.
///
/// # Provided Methods
/// - `test_connection`: Wraps `health_check` into a plain `bool`
#[async_trait]
pub trait Client: Send + Sync {
    /// Send a single message and return the plain-text reply.
    async fn chat(&self, message: &str) -> Result<String, ClientError>;

    /// Ask for a structured learning report.
    ///
    /// Absent fields in the server reply are replaced with defaults rather than
    /// failing the call.
    async fn generate_learning_report(&self, message: &str)
        -> Result<LearningReport, ClientError>;

    /// Query the knowledge base.
    async fn search_knowledge_base(&self, message: &str)
        -> Result<KnowledgeBaseResult, ClientError>;

    /// Hit the health endpoint and return its plain-text body.
    async fn health_check(&self) -> Result<String, ClientError>;

    /// Returns `true` when the health check succeeds. Failures never escape.
    async fn test_connection(&self) -> bool {
        match self.health_check().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "connection test failed");
                false
            }
        }
    }
}

/// Extension trait for streaming chat.
///
/// Kept apart from `Client` so request/response-only backends don't need to
/// carry session state.
#[async_trait]
pub trait StreamingClient: Client {
    /// Open a stream session and return its lazy sequence of text increments.
    ///
    /// Fails with [`ClientError::Connection`] if the handshake fails or is rejected.
    async fn stream_chat(&self, request: StreamRequest) -> Result<TextStream, ClientError>;

    /// Cancel the in-flight stream session, if any. Idempotent.
    fn cancel_stream(&self);
}
