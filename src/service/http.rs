//! HTTP client for the processing service

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{
    CancelResponse, ErrorBody, FileKind, HealthReport, ImageTags, MatchProposal, ModelInfo, ModelInfoEnvelope,
    PathCheck, ProcessRequest, ProcessResponse, SystemConfig, TagThresholds, VideoInfo, VideoInfoEnvelope,
};
use super::{Result, ServiceError, TaskService};
use crate::task::TaskStatus;

const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Bound on every call; exceeding it surfaces as [`ServiceError::Timeout`]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("vidtrack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`TaskService`] over the service's JSON API
#[derive(Debug, Clone)]
pub struct HttpTaskService {
    client: Client,
    base_url: Url,
}

impl HttpTaskService {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::Transport(format!("invalid base url '{}': {}", config.base_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Transport(format!("invalid base url '{}'", config.base_url)));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a route; segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport(format!("invalid base url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request_id = Uuid::new_v4().to_string();
        let request = request
            .header(header::ACCEPT, mime::APPLICATION_JSON.as_ref())
            .header(REQUEST_ID_HEADER, &request_id)
            .build()?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, request_id = %request_id, "Sending request");

        let response = self.client.execute(request).await.map_err(|e| {
            let err = ServiceError::from(e);
            debug!(%method, %url, request_id = %request_id, error = %err, "Request failed");
            err
        })?;

        debug!(%method, %url, request_id = %request_id, status = response.status().as_u16(), "Response received");
        Ok(response)
    }

    /// Map a non-success response to an error.
    ///
    /// `task_id` marks task routes, where 404 means the task is unknown.
    async fn reject(response: Response, task_id: Option<&str>) -> ServiceError {
        let status = response.status();
        let message = match response.bytes().await {
            Ok(body) => serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(ErrorBody::into_message),
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "Failed to read error body");
                None
            }
        };

        match (status, task_id) {
            (StatusCode::NOT_FOUND, Some(task_id)) => {
                ServiceError::NotFound(message.unwrap_or_else(|| format!("task {}", task_id)))
            }
            _ => ServiceError::Rejected {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::Decode("missing Content-Type header".to_string()))?;
        parse_json_content_type(content_type)?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn expect_json<T: DeserializeOwned>(&self, request: RequestBuilder, task_id: Option<&str>) -> Result<T> {
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(Self::reject(response, task_id).await);
        }
        Self::decode(response).await
    }
}

#[async_trait]
impl TaskService for HttpTaskService {
    async fn submit_job(&self, request: &ProcessRequest) -> Result<ProcessResponse> {
        let url = self.endpoint(&["api", "video", "process"])?;
        self.expect_json(self.client.post(url).json(request), None).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let url = self.endpoint(&["api", "video", "status", task_id])?;
        self.expect_json(self.client.get(url), Some(task_id)).await
    }

    async fn list_tasks(&self) -> Result<Vec<TaskStatus>> {
        let url = self.endpoint(&["api", "video", "tasks"])?;
        self.expect_json(self.client.get(url), None).await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<CancelResponse> {
        let url = self.endpoint(&["api", "video", "task", task_id])?;
        self.expect_json(self.client.delete(url), Some(task_id)).await
    }

    async fn validate_path(&self, path: &str, kind: FileKind) -> Result<PathCheck> {
        let url = self.endpoint(&["api", "video", "validate-path"])?;
        let request = self
            .client
            .get(url)
            .query(&[("file_path", path), ("file_type", kind.as_str())]);
        self.expect_json(request, None).await
    }

    async fn video_info(&self, video_path: &str) -> Result<VideoInfo> {
        let url = self.endpoint(&["api", "video", "info"])?;
        let request = self.client.get(url).query(&[("video_path", video_path)]);
        let envelope: VideoInfoEnvelope = self.expect_json(request, None).await?;
        Ok(envelope.video_info)
    }

    async fn health(&self) -> Result<HealthReport> {
        let url = self.endpoint(&["api", "health"])?;
        let response = self.send(self.client.get(url)).await?;

        // An unhealthy service still describes itself in a 500 body
        if response.status().is_success() || response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            return Self::decode(response).await;
        }
        Err(Self::reject(response, None).await)
    }

    async fn system_config(&self) -> Result<SystemConfig> {
        let url = self.endpoint(&["api", "config"])?;
        self.expect_json(self.client.get(url), None).await
    }

    async fn model_info(&self) -> Result<ModelInfo> {
        let url = self.endpoint(&["api", "tags", "model-info"])?;
        let envelope: ModelInfoEnvelope = self.expect_json(self.client.get(url), None).await?;
        Ok(envelope.model_info)
    }

    async fn analyze_image(&self, image_path: &str, thresholds: TagThresholds) -> Result<ImageTags> {
        let url = self.endpoint(&["api", "tags", "analyze-image"])?;
        let request = self
            .client
            .post(url)
            .query(&[("image_path", image_path)])
            .query(&thresholds.as_query());
        self.expect_json(request, None).await
    }

    async fn analyze_images(&self, image_paths: &[String], thresholds: TagThresholds) -> Result<Vec<ImageTags>> {
        let url = self.endpoint(&["api", "tags", "analyze-images"])?;
        let request = self.client.post(url).query(&thresholds.as_query()).json(image_paths);
        self.expect_json(request, None).await
    }

    async fn create_match_request(&self, reference_paths: &[String], min_confidence: f64) -> Result<MatchProposal> {
        let url = self.endpoint(&["api", "tags", "create-match-request"])?;
        let request = self
            .client
            .post(url)
            .query(&[("min_confidence", min_confidence)])
            .json(reference_paths);
        self.expect_json(request, None).await
    }
}

/// Accepts `application/json`, optionally with parameters such as charset.
pub(crate) fn parse_json_content_type(content_type: &str) -> Result<mime::Mime> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ServiceError::Decode(format!("invalid Content-Type: {}", content_type)))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ServiceError::Decode(format!(
            "expected application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}
