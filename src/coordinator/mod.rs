//! Local mirror of one remote task
//!
//! A [`TaskStatusCoordinator`] takes a task id, fetches its status right
//! away and then polls on a fixed interval until the task reaches a
//! terminal state, the caller cancels it, or the coordinator is stopped.
//!
//! ```text
//! idle --start--> tracking --terminal snapshot--> finished(completed|failed)
//!                     |
//!                     +--cancel confirmed--> finished(cancelled)
//! ```
//!
//! Snapshot application and cancellation both go through the session lock
//! and re-check the phase there, so a poll response that loses the race
//! against a confirmed cancel is dropped instead of reviving the task.

mod poller;
mod session;

pub use session::{Phase, Session};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::observability::Metrics;
use crate::service::{ServiceError, TaskService};
use crate::task::{TaskState, TaskStatus, TaskView};
use poller::{Applied, Shared};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("cancellation of task {task_id} not confirmed: {reason}")]
    Cancellation { task_id: String, reason: String },

    #[error("already tracking task {0}")]
    AlreadyStarted(String),

    #[error("no running task to act on")]
    NotTracking,

    #[error("coordinator was stopped")]
    Stopped,

    #[error("polling interval must be greater than zero")]
    ZeroInterval,

    #[error("status request failed: {0}")]
    Service(ServiceError),
}

pub struct TaskStatusCoordinator {
    shared: Arc<Shared>,
}

impl TaskStatusCoordinator {
    pub fn new(service: Arc<dyn TaskService>) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            shared: Arc::new(Shared {
                service,
                session,
                stop: CancellationToken::new(),
                metrics: Arc::new(Metrics::new()),
                interval: DEFAULT_POLL_INTERVAL,
            }),
        }
    }

    /// Set the polling interval. Only takes effect before [`start`](Self::start),
    /// which refuses a zero interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.interval = interval;
        }
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metrics = metrics;
        }
        self
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Begin tracking `task_id`.
    ///
    /// The first snapshot is fetched before returning. An unknown id leaves
    /// the coordinator idle; an already terminal task is held as final and
    /// never polled.
    pub async fn start(&self, task_id: impl Into<String>) -> Result<TaskStatus, CoordinatorError> {
        if self.shared.interval.is_zero() {
            return Err(CoordinatorError::ZeroInterval);
        }
        let task_id = task_id.into();

        let mut claimed = Err(CoordinatorError::Stopped);
        self.shared.update(|session| {
            if session.phase != Phase::Idle {
                claimed = Err(CoordinatorError::AlreadyStarted(
                    session.task_id.clone().unwrap_or_default(),
                ));
                return false;
            }
            session.task_id = Some(task_id.clone());
            session.phase = Phase::Tracking;
            claimed = Ok(());
            true
        });
        claimed?;

        let initial = match self.shared.service.task_status(&task_id).await {
            Ok(initial) => initial,
            Err(e) => {
                self.shared.update(|session| {
                    *session = Session::default();
                    true
                });
                return Err(match e {
                    ServiceError::NotFound(_) => CoordinatorError::NotFound(task_id),
                    other => CoordinatorError::Service(other),
                });
            }
        };

        match self.shared.apply(initial.clone()) {
            Applied::Discarded => Err(CoordinatorError::Stopped),
            Applied::Terminal(state) => {
                info!(%task_id, %state, "Task already finished, not polling");
                self.shared.halt();
                Ok(initial)
            }
            Applied::Running => {
                info!(%task_id, state = %initial.state, "Tracking task");
                tokio::spawn(poller::run(self.shared.clone(), task_id));
                Ok(initial)
            }
        }
    }

    /// Ask the service to cancel the tracked task.
    ///
    /// On confirmation the task is held as cancelled and polling ends, even
    /// if a poll was in flight. If a terminal snapshot landed while the
    /// request was out, that snapshot is kept. An unconfirmed cancel leaves
    /// the coordinator tracking. Until `start` holds the first snapshot
    /// there is nothing to cancel and no request is sent.
    pub async fn cancel(&self) -> Result<TaskStatus, CoordinatorError> {
        let task_id = {
            let session = self.shared.session.borrow();
            match (session.phase, &session.task_id, &session.snapshot) {
                (Phase::Tracking, Some(task_id), Some(_)) if !self.shared.stop.is_cancelled() => {
                    task_id.clone()
                }
                _ => return Err(CoordinatorError::NotTracking),
            }
        };

        let reason = match self.shared.service.cancel_task(&task_id).await {
            Ok(response) if response.success => None,
            Ok(response) => Some(response.message.unwrap_or_else(|| "service declined".to_string())),
            Err(e) => Some(e.remote_message().map(str::to_string).unwrap_or_else(|| e.to_string())),
        };
        if let Some(reason) = reason {
            warn!(%task_id, %reason, "Cancellation not confirmed");
            return Err(CoordinatorError::Cancellation { task_id, reason });
        }

        let now = Utc::now();
        let mut held = None;
        self.shared.update(|session| {
            if session.phase == Phase::Tracking {
                if let Some(cancelled) = session.snapshot.as_ref().map(|s| s.cancelled_at(now)) {
                    session.hold(cancelled, now);
                }
                session.phase = Phase::Finished(TaskState::Cancelled);
                held = session.snapshot.clone();
                return true;
            }
            held = session.snapshot.clone();
            false
        });
        self.shared.halt();

        info!(%task_id, "Task cancelled");
        held.ok_or(CoordinatorError::Stopped)
    }

    /// Stop polling and freeze the session. Idempotent.
    pub fn stop(&self) {
        if !self.shared.stop.is_cancelled() {
            self.shared.halt();
        }
    }

    /// Polling is active: tracking and not stopped.
    pub fn is_polling(&self) -> bool {
        self.phase() == Phase::Tracking && !self.shared.stop.is_cancelled()
    }

    pub fn phase(&self) -> Phase {
        self.shared.session.borrow().phase
    }

    pub fn task_id(&self) -> Option<String> {
        self.shared.session.borrow().task_id.clone()
    }

    pub fn snapshot(&self) -> Option<TaskStatus> {
        self.shared.session.borrow().snapshot.clone()
    }

    pub fn session(&self) -> Session {
        self.shared.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.shared.session.subscribe()
    }

    pub fn derive_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.shared.session.borrow().derive_elapsed(now)
    }

    pub fn view(&self, now: DateTime<Utc>) -> Option<TaskView> {
        self.shared.session.borrow().view(now)
    }

    /// Resolve with the final snapshot once one is held, or `None` if the
    /// coordinator is stopped first.
    pub async fn wait_finished(&self) -> Option<TaskStatus> {
        let mut updates = self.shared.session.subscribe();
        tokio::select! {
            biased;
            finished = updates.wait_for(|session| session.phase.is_finished()) => {
                finished.ok().and_then(|session| session.snapshot.clone())
            }
            _ = self.shared.stop.cancelled() => {
                let session = self.shared.session.borrow();
                session.phase.is_finished().then(|| session.snapshot.clone()).flatten()
            }
        }
    }
}

impl Drop for TaskStatusCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{CancelResponse, MockReply, MockTaskService};
    use chrono::TimeZone;

    fn status(state: TaskState, progress: f64) -> TaskStatus {
        TaskStatus {
            task_id: "t1".to_string(),
            state,
            progress,
            current_step: "tagging".to_string(),
            total_steps: 5,
            completed_steps: 2,
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            end_time: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mock = Arc::new(MockTaskService::new());
        mock.push_status("t1", MockReply::ok(status(TaskState::Processing, 0.1)));

        let coordinator = TaskStatusCoordinator::new(mock);
        coordinator.start("t1").await.unwrap();

        let err = coordinator.start("t2").await.unwrap_err();
        assert_eq!(err, CoordinatorError::AlreadyStarted("t1".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_requires_tracking() {
        let mock = Arc::new(MockTaskService::new());
        let coordinator = TaskStatusCoordinator::new(mock.clone());

        assert_eq!(coordinator.cancel().await.unwrap_err(), CoordinatorError::NotTracking);
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_declined_cancel_keeps_tracking() {
        let mock = Arc::new(MockTaskService::new());
        mock.push_status("t1", MockReply::ok(status(TaskState::Processing, 0.3)));
        mock.push_cancel(
            "t1",
            MockReply::ok(CancelResponse {
                success: false,
                message: Some("task already finishing".to_string()),
            }),
        );

        let coordinator = TaskStatusCoordinator::new(mock);
        coordinator.start("t1").await.unwrap();

        let err = coordinator.cancel().await.unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::Cancellation {
                task_id: "t1".to_string(),
                reason: "task already finishing".to_string(),
            }
        );
        assert_eq!(coordinator.phase(), Phase::Tracking);
        assert!(coordinator.is_polling());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_freezes_state() {
        let mock = Arc::new(MockTaskService::new());
        mock.push_status("t1", MockReply::ok(status(TaskState::Pending, 0.0)));

        let coordinator = TaskStatusCoordinator::new(mock);
        coordinator.start("t1").await.unwrap();
        let before = coordinator.session();

        coordinator.stop();
        coordinator.stop();

        assert!(!coordinator.is_polling());
        assert_eq!(coordinator.session(), before);
        assert_eq!(coordinator.cancel().await.unwrap_err(), CoordinatorError::NotTracking);
        assert_eq!(coordinator.wait_finished().await, None);
    }

    #[tokio::test]
    async fn test_zero_interval_is_refused_before_any_request() {
        let mock = Arc::new(MockTaskService::new());
        mock.push_status("t1", MockReply::ok(status(TaskState::Processing, 0.1)));

        let coordinator = TaskStatusCoordinator::new(mock.clone()).with_interval(Duration::ZERO);
        assert_eq!(coordinator.start("t1").await.unwrap_err(), CoordinatorError::ZeroInterval);
        assert_eq!(coordinator.phase(), Phase::Idle);
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_service_error_on_start_reverts_to_idle() {
        let mock = Arc::new(MockTaskService::new());
        mock.push_status("t1", MockReply::err(ServiceError::Timeout));

        let coordinator = TaskStatusCoordinator::new(mock);
        let err = coordinator.start("t1").await.unwrap_err();

        assert_eq!(err, CoordinatorError::Service(ServiceError::Timeout));
        assert_eq!(coordinator.phase(), Phase::Idle);
        assert_eq!(coordinator.task_id(), None);
    }
}
