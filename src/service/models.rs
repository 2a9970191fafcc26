//! Wire models for the processing service's JSON API.
//!
//! Field names follow the service (snake_case). Every response type
//! tolerates extra fields so newer service versions keep working.
//!
//! # Submission
//!
//! `POST /api/video/process` accepts a [`ProcessRequest`]:
//!
//! ```json
//! {
//!   "video_path": "/videos/ep01.mp4",
//!   "reference_image_paths": ["/refs/hero.png"],
//!   "output_directory": "/datasets/hero",
//!   "config": { "max_frames": 200, "batch_size": 16, "...": "..." }
//! }
//! ```
//!
//! and answers with either a single task (`{"task_id": "..."}`) or a
//! batch (`{"task_ids": [...], "main_task_id": "...", ...}`), see
//! [`ProcessResponse`].
//!
//! # Tagging
//!
//! The `/api/tags/...` routes run the tagger model on images that live on
//! the service host. Image lists travel as a bare JSON array in the body;
//! thresholds travel in the query string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::job::{JobDescription, ProcessingConfig};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRequest {
    pub video_path: String,
    pub reference_image_paths: Vec<String>,
    pub output_directory: String,
    pub config: ProcessingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

impl ProcessRequest {
    /// Outbound request for `job`, with blank reference paths dropped.
    pub fn from_job(job: &JobDescription) -> Self {
        Self {
            video_path: job.video_path.clone(),
            reference_image_paths: job.non_empty_references(),
            output_directory: job.output_directory.clone(),
            config: job.config.clone(),
            output_name: job.output_name.clone(),
        }
    }
}

/// The two response shapes of the submission endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProcessResponse {
    Batch(BatchAccepted),
    Single(SingleAccepted),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SingleAccepted {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchAccepted {
    pub task_ids: Vec<String>,
    pub main_task_id: String,
    #[serde(default)]
    pub total_videos: u32,
    #[serde(default)]
    pub processed_videos: Vec<String>,
    #[serde(default)]
    pub output_directory: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Kind of file a path is expected to point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Image,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Image => "image",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" => Ok(FileKind::Video),
            "image" => Ok(FileKind::Image),
            other => Err(format!("unknown file kind '{}', expected 'video' or 'image'", other)),
        }
    }
}

/// Answer of `GET /api/video/validate-path`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathCheck {
    pub valid: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub fps: f64,
    #[serde(default)]
    pub total_frames: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VideoInfoEnvelope {
    pub video_info: VideoInfo,
}

/// Answer of `GET /api/health`.
///
/// An unhealthy service answers 500 with `{status, error}`; that body is
/// still decoded into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub model_info: Option<ModelInfo>,
    #[serde(default)]
    pub config: Option<HealthConfig>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub total_tags: u64,
    #[serde(default)]
    pub general_tags_count: u64,
    #[serde(default)]
    pub character_tags_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub max_frames: Option<u32>,
    #[serde(default)]
    pub scene_change_threshold: Option<f64>,
    #[serde(default)]
    pub quality_threshold: Option<f64>,
}

/// Answer of `GET /api/config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub processing_config: ProcessingConfig,
    #[serde(default)]
    pub supported_video_formats: Vec<String>,
    #[serde(default)]
    pub supported_image_formats: Vec<String>,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub device: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelInfoEnvelope {
    pub model_info: ModelInfo,
}

/// Minimum average confidence for a reference tag to become required
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    General,
    Character,
    Rating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    pub name: String,
    pub confidence: f64,
    pub category: TagCategory,
}

/// Tags found in one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTags {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub tags: Vec<TagResult>,
    #[serde(default)]
    pub ratings: BTreeMap<String, f64>,
    #[serde(default)]
    pub character_tags: Vec<TagResult>,
    #[serde(default)]
    pub general_tags: Vec<TagResult>,
}

/// Confidence cut-offs applied by the tagger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagThresholds {
    pub general: f64,
    pub character: f64,
}

impl TagThresholds {
    pub(crate) fn as_query(&self) -> [(&'static str, f64); 2] {
        [("general_threshold", self.general), ("character_threshold", self.character)]
    }
}

impl Default for TagThresholds {
    fn default() -> Self {
        Self {
            general: 0.35,
            character: 0.75,
        }
    }
}

impl From<&ProcessingConfig> for TagThresholds {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            general: config.general_tag_threshold,
            character: config.character_tag_threshold,
        }
    }
}

/// Tag filter the service applies to extracted frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMatchRequest {
    #[serde(default)]
    pub required_tags: Vec<String>,
    #[serde(default)]
    pub excluded_tags: Vec<String>,
    #[serde(default)]
    pub character_tags: Vec<String>,
    #[serde(default)]
    pub min_rating_general: f64,
    #[serde(default)]
    pub max_rating_sensitive: f64,
    #[serde(default)]
    pub character_tag_threshold: f64,
    #[serde(default)]
    pub general_tag_threshold: f64,
}

/// Answer of `POST /api/tags/create-match-request`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProposal {
    pub match_request: TagMatchRequest,
    #[serde(default)]
    pub reference_analysis: Vec<ImageTags>,
}

/// Error bodies: FastAPI uses `detail`, other handlers `message` or `error`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        let detail = self.detail.and_then(|detail| match detail {
            serde_json::Value::String(text) => Some(text),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });

        detail
            .or(self.message)
            .or(self.error)
            .filter(|message| !message.trim().is_empty())
    }
}
