//! Client side of the remote processing service
//!
//! [`TaskService`] is the seam every component talks through.
//! [`HttpTaskService`] speaks the service's JSON-over-HTTP API;
//! [`MockTaskService`] is a scriptable in-memory stand-in for tests.

mod error;
mod http;
mod mock;
pub mod models;

pub use error::ServiceError;
pub use http::{HttpConfig, HttpTaskService};
pub use mock::{MockReply, MockTaskService};
pub use models::{
    CancelResponse, FileKind, HealthReport, ImageTags, MatchProposal, ModelInfo, PathCheck, ProcessRequest,
    ProcessResponse, SystemConfig, TagCategory, TagMatchRequest, TagResult, TagThresholds, VideoInfo,
};

use async_trait::async_trait;

use crate::task::TaskStatus;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Operations offered by the processing service
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Start processing; answers with one task or a batch of tasks
    async fn submit_job(&self, request: &ProcessRequest) -> Result<ProcessResponse>;

    /// Current snapshot of a task
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus>;

    /// Snapshots of every task the service knows about
    async fn list_tasks(&self) -> Result<Vec<TaskStatus>>;

    /// Ask the service to cancel a task
    async fn cancel_task(&self, task_id: &str) -> Result<CancelResponse>;

    /// Check that `path` exists and has an extension allowed for `kind`
    async fn validate_path(&self, path: &str, kind: FileKind) -> Result<PathCheck>;

    async fn video_info(&self, video_path: &str) -> Result<VideoInfo>;

    async fn health(&self) -> Result<HealthReport>;

    async fn system_config(&self) -> Result<SystemConfig>;

    /// Tagger model loaded by the service
    async fn model_info(&self) -> Result<ModelInfo>;

    /// Tag one image on the service host
    async fn analyze_image(&self, image_path: &str, thresholds: TagThresholds) -> Result<ImageTags>;

    /// Tag several images in one request; results follow the input order
    async fn analyze_images(&self, image_paths: &[String], thresholds: TagThresholds) -> Result<Vec<ImageTags>>;

    /// Derive a tag match request from reference images
    async fn create_match_request(&self, reference_paths: &[String], min_confidence: f64) -> Result<MatchProposal>;
}
