//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

/// Backend default: port 8081, servlet context path `/api`.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8081/api";

pub const ENV_BASE_URL: &str = "CODE_HELPER_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "CODE_HELPER_TIMEOUT_SECS";
pub const ENV_PROXY: &str = "CODE_HELPER_PROXY";

/// HTTP transport options.
///
/// `timeout` bounds a whole request including its body, so it also bounds
/// stream sessions. It is unset by default: a stream that never ends is only
/// stopped by cancellation.
///
/// # Example
/// ```rust
/// use codehelper::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new("http://localhost:8081/api")
///     .with_connect_timeout(Duration::from_secs(5))
///     .with_header("X-Client".to_string(), "cli".to_string());
/// assert_eq!(options.base_url, "http://localhost:8081/api");
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL that endpoint paths like `/ai/chat` are appended to
    pub base_url: String,

    /// Total request timeout
    pub timeout: Option<Duration>,

    /// Connection establishment timeout
    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            connect_timeout: None,
            proxy: None,
            extra_headers: None,
        }
    }

    /// Read options from `CODE_HELPER_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build options from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::new(lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()));

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT_SECS, raw))
            })?;
            options.timeout = Some(Duration::from_secs(secs));
        }

        if let Some(proxy) = lookup(ENV_PROXY).filter(|p| !p.is_empty()) {
            options.proxy = Some(proxy);
        }

        Ok(options)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
