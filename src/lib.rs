//! # codehelper - AI Code Helper client library
//!
//! An async client for the AI Code Helper assistant service: streamed chat
//! over Server-Sent Events, learning reports, knowledge-base lookups and a
//! health check, plus pluggable storage for conversation history.
//!
//! ## Architecture
//!
//! The streaming path is layered leaf-first:
//!
//! 1. **`sse`**: decodes raw byte chunks into `StreamEvent`s, independent of
//!    how the transport chunked them
//! 2. **`session`**: owns one stream session at a time, with cancellation and
//!    guaranteed release of the connection
//! 3. **`consumer`**: accumulates increments and reports the full text after
//!    each one
//!
//! Request/response calls go through the `Client` trait, implemented for the
//! HTTP service by `providers::CodeHelperClient`. `conversation` combines a
//! client with `storage` into a headless chat controller.
//!
//! ## Example
//! ```no_run
//! use codehelper::client::StreamingClient;
//! use codehelper::consumer::consume_stream;
//! use codehelper::model::StreamRequest;
//! use codehelper::options::ClientOptions;
//! use codehelper::providers::CodeHelperClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CodeHelperClient::new(ClientOptions::new("http://localhost:8081/api"))?;
//!
//!     let stream = client
//!         .stream_chat(StreamRequest::new("What is a lifetime?")?)
//!         .await?;
//!     let reply = consume_stream(stream, |text| {
//!         // Replace the displayed reply with `text`.
//!         let _ = text;
//!     })
//!     .await?;
//!
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod consumer;
pub mod conversation;
pub mod http;
pub mod messages;
pub mod model;
pub mod options;
pub mod providers;
pub mod session;
pub mod sse;
pub mod storage;

// Re-exports for convenience
pub use client::{Client, ClientError, StreamingClient};
pub use consumer::consume_stream;
pub use model::{KnowledgeBaseResult, LearningReport, StreamEvent, StreamRequest};
pub use providers::CodeHelperClient;
pub use session::{StreamController, TextStream};
