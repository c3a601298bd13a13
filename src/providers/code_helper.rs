//! AI Code Helper service client.
//!
//! Implements `Client` and `StreamingClient` against the service's `/ai/*`
//! endpoints. Request/response calls are stateless; the client only keeps the
//! [`StreamController`] that tracks the current stream session.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{Client, ClientError, Operation, StreamingClient};
use crate::http::{add_extra_headers, build_http_client, ensure_success};
use crate::model::{ContentSource, KnowledgeBaseResult, LearningReport, StreamRequest};
use crate::options::ClientOptions;
use crate::session::{StreamController, TextStream};

const DEFAULT_STUDENT_NAME: &str = "Student";
const NO_RECOMMENDATIONS: &str = "No recommendations available";
const NO_RESPONSE: &str = "No response";

/// Client for the AI Code Helper service.
pub struct CodeHelperClient {
    http: reqwest::Client,
    options: ClientOptions,
    streams: StreamController,
}

impl CodeHelperClient {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self {
            http,
            options,
            streams: StreamController::new(),
        })
    }

    /// Create a client configured from `CODE_HELPER_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientOptions::from_env()?)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Whether a stream session is live and uncancelled.
    pub fn is_streaming(&self) -> bool {
        self.streams.is_active()
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        add_extra_headers(
            self.http.get(self.options.endpoint(path)),
            &self.options.extra_headers,
        )
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        add_extra_headers(
            self.http.post(self.options.endpoint(path)),
            &self.options.extra_headers,
        )
    }

    async fn post_message(
        &self,
        path: &str,
        message: &str,
        operation: Operation,
    ) -> Result<String, ClientError> {
        let response = self
            .post(path)
            .json(&MessageBody { message })
            .send()
            .await?;
        let body = ensure_success(response, operation)?.text().await?;
        Ok(body)
    }
}

#[async_trait]
impl Client for CodeHelperClient {
    async fn chat(&self, message: &str) -> Result<String, ClientError> {
        debug!(chars = message.chars().count(), "sending chat request");

        // The endpoint takes the message itself as a JSON string.
        let response = self.post("/ai/chat").json(message).send().await?;
        let body = ensure_success(response, Operation::Chat)?.text().await?;
        Ok(body)
    }

    async fn generate_learning_report(
        &self,
        message: &str,
    ) -> Result<LearningReport, ClientError> {
        debug!(chars = message.chars().count(), "requesting learning report");

        let body = self
            .post_message("/ai/learning-report", message, Operation::LearningReport)
            .await?;
        let raw: LearningReportResponse = serde_json::from_str(&body)?;
        Ok(raw.into())
    }

    async fn search_knowledge_base(
        &self,
        message: &str,
    ) -> Result<KnowledgeBaseResult, ClientError> {
        debug!(chars = message.chars().count(), "searching knowledge base");

        let body = self
            .post_message("/ai/chat/knowledge", message, Operation::KnowledgeBase)
            .await?;
        let raw: KnowledgeBaseResponse = serde_json::from_str(&body)?;
        Ok(raw.into())
    }

    async fn health_check(&self) -> Result<String, ClientError> {
        let response = self.get("/ai/health").send().await?;
        let body = ensure_success(response, Operation::HealthCheck)?.text().await?;
        Ok(body)
    }
}

#[async_trait]
impl StreamingClient for CodeHelperClient {
    async fn stream_chat(&self, request: StreamRequest) -> Result<TextStream, ClientError> {
        info!(
            memory_id = request.memory_id(),
            chars = request.message().chars().count(),
            "opening chat stream"
        );

        let memory_id = request.memory_id().to_string();
        let req = self
            .get("/ai/chat/stream")
            .query(&[("message", request.message()), ("memoryId", memory_id.as_str())])
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        self.streams.open(req).await
    }

    fn cancel_stream(&self) {
        self.streams.cancel();
    }
}

impl From<LearningReportResponse> for LearningReport {
    fn from(raw: LearningReportResponse) -> Self {
        let recommendations = raw.recommendations.unwrap_or_else(|| {
            vec![non_empty(raw.error).unwrap_or_else(|| NO_RECOMMENDATIONS.to_string())]
        });

        LearningReport {
            student_name: non_empty(raw.student_name)
                .unwrap_or_else(|| DEFAULT_STUDENT_NAME.to_string()),
            recommendations,
        }
    }
}

impl From<KnowledgeBaseResponse> for KnowledgeBaseResult {
    fn from(raw: KnowledgeBaseResponse) -> Self {
        KnowledgeBaseResult {
            content: non_empty(raw.content)
                .or_else(|| non_empty(raw.error))
                .unwrap_or_else(|| NO_RESPONSE.to_string()),
            sources: raw.sources.unwrap_or_default(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// --- Service Request/Response Types ---

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LearningReportResponse {
    student_name: Option<String>,
    recommendations: Option<Vec<String>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeBaseResponse {
    content: Option<String>,
    sources: Option<Vec<ContentSource>>,
    error: Option<String>,
}
