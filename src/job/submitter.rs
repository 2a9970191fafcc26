use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::description::JobDescription;
use super::validation::{ValidationError, validate_job};
use crate::observability::Metrics;
use crate::service::models::{BatchAccepted, ProcessRequest, ProcessResponse};
use crate::service::{ServiceError, TaskService};

/// The service did not accept the job
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SubmissionError {
    /// Remote message when the service sent one, otherwise a generic one
    pub message: String,
    #[source]
    pub cause: ServiceError,
}

impl From<ServiceError> for SubmissionError {
    fn from(cause: ServiceError) -> Self {
        let message = match (&cause, cause.remote_message()) {
            (_, Some(remote)) => remote.to_string(),
            (ServiceError::Transport(_) | ServiceError::Timeout, None) => {
                "could not reach the processing service".to_string()
            }
            (ServiceError::Rejected { status, .. }, None) => {
                format!("processing service rejected the job (HTTP {})", status)
            }
            _ => "unexpected response from the processing service".to_string(),
        };
        SubmissionError { message, cause }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("invalid job: {0}")]
    Validation(#[from] ValidationError),
    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),
}

/// Batch details reported when one request fanned out into several tasks
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total_videos: u32,
    pub processed_videos: Vec<String>,
    pub output_directory: String,
}

/// Uniform view of both submission response shapes
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    /// The one task a coordinator should track
    pub primary_task_id: String,
    pub all_task_ids: Vec<String>,
    pub batch: Option<BatchSummary>,
}

impl SubmissionResult {
    pub fn is_batch(&self) -> bool {
        self.batch.is_some()
    }
}

impl From<ProcessResponse> for SubmissionResult {
    fn from(response: ProcessResponse) -> Self {
        match response {
            ProcessResponse::Single(single) => SubmissionResult {
                all_task_ids: vec![single.task_id.clone()],
                primary_task_id: single.task_id,
                batch: None,
            },
            ProcessResponse::Batch(BatchAccepted {
                task_ids,
                main_task_id,
                total_videos,
                processed_videos,
                output_directory,
            }) => SubmissionResult {
                primary_task_id: main_task_id,
                all_task_ids: task_ids,
                batch: Some(BatchSummary {
                    total_videos,
                    processed_videos,
                    output_directory,
                }),
            },
        }
    }
}

/// Turns a [`JobDescription`] into running tasks. No retries.
#[derive(Clone)]
pub struct JobSubmitter {
    service: Arc<dyn TaskService>,
    metrics: Arc<Metrics>,
}

impl JobSubmitter {
    pub fn new(service: Arc<dyn TaskService>) -> Self {
        Self {
            service,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate locally, then submit.
    ///
    /// Local failures return before any remote call is made.
    pub async fn submit(&self, job: JobDescription) -> Result<SubmissionResult, SubmitError> {
        validate_job(&job)?;

        let request = ProcessRequest::from_job(&job);
        info!(
            video_path = %request.video_path,
            references = request.reference_image_paths.len(),
            output_directory = %request.output_directory,
            "Submitting processing job"
        );

        self.metrics.submission();
        let response = self.service.submit_job(&request).await.map_err(|e| {
            warn!(error = %e, "Job submission failed");
            SubmissionError::from(e)
        })?;

        let result = SubmissionResult::from(response);
        if result.primary_task_id.trim().is_empty() {
            return Err(SubmissionError::from(ServiceError::Decode("response carried no task id".to_string())).into());
        }

        info!(
            primary_task_id = %result.primary_task_id,
            tasks = result.all_task_ids.len(),
            batch = result.is_batch(),
            "Job accepted"
        );
        Ok(result)
    }
}
