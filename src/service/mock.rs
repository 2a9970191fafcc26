//! Scriptable in-memory service for tests and offline development

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::models::{
    CancelResponse, FileKind, HealthReport, ImageTags, MatchProposal, ModelInfo, PathCheck, ProcessRequest,
    ProcessResponse, SystemConfig, TagThresholds, VideoInfo,
};
use super::{Result, ServiceError, TaskService};
use crate::task::TaskStatus;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    Ready(Result<T>),
    /// Resolves after the delay; pairs with paused tokio time in tests
    Delayed(Duration, Result<T>),
}

impl<T> MockReply<T> {
    pub fn ok(value: T) -> Self {
        MockReply::Ready(Ok(value))
    }

    pub fn err(error: ServiceError) -> Self {
        MockReply::Ready(Err(error))
    }

    pub fn delayed(delay: Duration, result: Result<T>) -> Self {
        MockReply::Delayed(delay, result)
    }

    async fn resolve(self) -> Result<T> {
        match self {
            MockReply::Ready(result) => result,
            MockReply::Delayed(delay, result) => {
                tokio::time::sleep(delay).await;
                result
            }
        }
    }
}

/// Queue of replies; the last one repeats forever
#[derive(Debug)]
struct Script<T> {
    replies: VecDeque<MockReply<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: VecDeque::new(),
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<MockReply<T>> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct CallLog {
    submitted: Vec<ProcessRequest>,
    status: HashMap<String, usize>,
    cancel: HashMap<String, usize>,
    validated: Vec<(String, FileKind)>,
    analyzed: Vec<(String, TagThresholds)>,
    other: usize,
}

#[derive(Debug, Default)]
struct Scripts {
    submissions: Script<ProcessResponse>,
    statuses: HashMap<String, Script<TaskStatus>>,
    cancels: HashMap<String, Script<CancelResponse>>,
    paths: HashMap<String, Script<PathCheck>>,
    tasks: Vec<TaskStatus>,
    video_info: Option<VideoInfo>,
    health: Option<HealthReport>,
    system_config: Option<SystemConfig>,
    image_tags: HashMap<String, Script<ImageTags>>,
    model_info: Option<ModelInfo>,
    match_proposal: Option<MatchProposal>,
}

/// In-memory [`TaskService`] answering from per-route scripts.
///
/// Unscripted task ids answer [`ServiceError::NotFound`]; other unscripted
/// routes answer a transport error. Every call is recorded.
#[derive(Debug, Default)]
pub struct MockTaskService {
    scripts: Mutex<Scripts>,
    calls: Mutex<CallLog>,
}

impl MockTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submission(&self, reply: MockReply<ProcessResponse>) {
        self.scripts().submissions.replies.push_back(reply);
    }

    pub fn push_status(&self, task_id: &str, reply: MockReply<TaskStatus>) {
        self.scripts()
            .statuses
            .entry(task_id.to_string())
            .or_default()
            .replies
            .push_back(reply);
    }

    pub fn push_cancel(&self, task_id: &str, reply: MockReply<CancelResponse>) {
        self.scripts()
            .cancels
            .entry(task_id.to_string())
            .or_default()
            .replies
            .push_back(reply);
    }

    pub fn push_path_check(&self, path: &str, reply: MockReply<PathCheck>) {
        self.scripts()
            .paths
            .entry(path.to_string())
            .or_default()
            .replies
            .push_back(reply);
    }

    pub fn set_tasks(&self, tasks: Vec<TaskStatus>) {
        self.scripts().tasks = tasks;
    }

    pub fn set_video_info(&self, info: VideoInfo) {
        self.scripts().video_info = Some(info);
    }

    pub fn set_health(&self, report: HealthReport) {
        self.scripts().health = Some(report);
    }

    pub fn set_system_config(&self, config: SystemConfig) {
        self.scripts().system_config = Some(config);
    }

    pub fn push_image_tags(&self, image_path: &str, reply: MockReply<ImageTags>) {
        self.scripts()
            .image_tags
            .entry(image_path.to_string())
            .or_default()
            .replies
            .push_back(reply);
    }

    pub fn set_model_info(&self, info: ModelInfo) {
        self.scripts().model_info = Some(info);
    }

    pub fn set_match_proposal(&self, proposal: MatchProposal) {
        self.scripts().match_proposal = Some(proposal);
    }

    /// Images sent for tagging, with the thresholds they were sent with.
    pub fn analyzed_images(&self) -> Vec<(String, TagThresholds)> {
        self.calls().analyzed.clone()
    }

    pub fn submitted_requests(&self) -> Vec<ProcessRequest> {
        self.calls().submitted.clone()
    }

    pub fn status_calls(&self, task_id: &str) -> usize {
        self.calls().status.get(task_id).copied().unwrap_or(0)
    }

    pub fn cancel_calls(&self, task_id: &str) -> usize {
        self.calls().cancel.get(task_id).copied().unwrap_or(0)
    }

    pub fn validated_paths(&self) -> Vec<(String, FileKind)> {
        self.calls().validated.clone()
    }

    /// Number of calls across every route.
    pub fn total_calls(&self) -> usize {
        let calls = self.calls();
        calls.submitted.len()
            + calls.status.values().sum::<usize>()
            + calls.cancel.values().sum::<usize>()
            + calls.validated.len()
            + calls.analyzed.len()
            + calls.other
    }

    fn scripts(&self) -> MutexGuard<'_, Scripts> {
        self.scripts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn calls(&self) -> MutexGuard<'_, CallLog> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unscripted(route: &str) -> ServiceError {
    ServiceError::Transport(format!("no reply scripted for {}", route))
}

#[async_trait]
impl TaskService for MockTaskService {
    async fn submit_job(&self, request: &ProcessRequest) -> Result<ProcessResponse> {
        self.calls().submitted.push(request.clone());
        let reply = self.scripts().submissions.next();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(unscripted("submit_job")),
        }
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        *self.calls().status.entry(task_id.to_string()).or_default() += 1;
        let reply = self.scripts().statuses.get_mut(task_id).and_then(Script::next);
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(ServiceError::NotFound(format!("task {}", task_id))),
        }
    }

    async fn list_tasks(&self) -> Result<Vec<TaskStatus>> {
        self.calls().other += 1;
        Ok(self.scripts().tasks.clone())
    }

    async fn cancel_task(&self, task_id: &str) -> Result<CancelResponse> {
        *self.calls().cancel.entry(task_id.to_string()).or_default() += 1;
        let reply = self.scripts().cancels.get_mut(task_id).and_then(Script::next);
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(ServiceError::NotFound(format!("task {}", task_id))),
        }
    }

    async fn validate_path(&self, path: &str, kind: FileKind) -> Result<PathCheck> {
        self.calls().validated.push((path.to_string(), kind));
        let reply = self.scripts().paths.get_mut(path).and_then(Script::next);
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(unscripted("validate_path")),
        }
    }

    async fn video_info(&self, _video_path: &str) -> Result<VideoInfo> {
        self.calls().other += 1;
        let info = self.scripts().video_info.clone();
        info.ok_or_else(|| unscripted("video_info"))
    }

    async fn health(&self) -> Result<HealthReport> {
        self.calls().other += 1;
        let report = self.scripts().health.clone();
        report.ok_or_else(|| unscripted("health"))
    }

    async fn system_config(&self) -> Result<SystemConfig> {
        self.calls().other += 1;
        let config = self.scripts().system_config.clone();
        config.ok_or_else(|| unscripted("system_config"))
    }

    async fn model_info(&self) -> Result<ModelInfo> {
        self.calls().other += 1;
        let info = self.scripts().model_info.clone();
        info.ok_or_else(|| unscripted("model_info"))
    }

    async fn analyze_image(&self, image_path: &str, thresholds: TagThresholds) -> Result<ImageTags> {
        self.calls().analyzed.push((image_path.to_string(), thresholds));
        let reply = self.scripts().image_tags.get_mut(image_path).and_then(Script::next);
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(unscripted("analyze_image")),
        }
    }

    async fn analyze_images(&self, image_paths: &[String], thresholds: TagThresholds) -> Result<Vec<ImageTags>> {
        let mut results = Vec::with_capacity(image_paths.len());
        for path in image_paths {
            results.push(self.analyze_image(path, thresholds).await?);
        }
        Ok(results)
    }

    async fn create_match_request(&self, _reference_paths: &[String], _min_confidence: f64) -> Result<MatchProposal> {
        self.calls().other += 1;
        let proposal = self.scripts().match_proposal.clone();
        proposal.ok_or_else(|| unscripted("create_match_request"))
    }
}
