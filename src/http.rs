//! HTTP client utilities shared by the request facade and stream sessions.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use tracing::warn;

use crate::client::{ClientError, Operation};
use crate::options::ClientOptions;

/// Build a configured HTTP client from client options.
///
/// This applies common configuration like timeouts and proxies. An
/// unparseable proxy URL is ignored.
pub fn build_http_client(options: &ClientOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(timeout) = options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy"),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in the options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Human-readable reason phrase for a status code.
pub fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown").to_string()
}

/// Pass a successful response through, or tag the failure with its operation.
pub fn ensure_success(response: Response, operation: Operation) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_text = status_text(status);
    warn!(%operation, status = status.as_u16(), %status_text, "request rejected");
    Err(ClientError::Operation {
        operation,
        status_text,
    })
}
