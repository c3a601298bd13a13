//! Streaming chat against a running AI Code Helper service.
//!
//! Run with:
//! ```bash
//! export CODE_HELPER_BASE_URL="http://localhost:8081/api"
//! RUST_LOG=codehelper=debug cargo run --example stream_chat -- "Explain Rust lifetimes"
//! ```
//!
//! Press Ctrl-C to cancel the stream; the partial reply is kept.

use std::io::Write;
use std::sync::Arc;

use codehelper::client::{Client, StreamingClient};
use codehelper::consumer::{consume_stream, ERROR_INDICATOR};
use codehelper::model::StreamRequest;
use codehelper::providers::CodeHelperClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let message = if message.is_empty() {
        "Write a haiku about Rust programming.".to_string()
    } else {
        message
    };

    let client = Arc::new(CodeHelperClient::from_env()?);

    if !client.test_connection().await {
        eprintln!("Service at {} is not reachable", client.options().base_url);
        return Ok(());
    }

    let canceller = Arc::clone(&client);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel_stream();
        }
    });

    let stream = client.stream_chat(StreamRequest::new(message)?).await?;

    // Updates carry the whole reply so far; print only what is new.
    let mut printed = 0;
    let reply = consume_stream(stream, |text| {
        if text == ERROR_INDICATOR {
            return;
        }
        if let Some(new) = text.get(printed..) {
            print!("{}", new);
            let _ = std::io::stdout().flush();
        }
        printed = text.len();
    })
    .await?;

    println!("\n\n=== Stream Complete ({} chars) ===", reply.chars().count());
    Ok(())
}
