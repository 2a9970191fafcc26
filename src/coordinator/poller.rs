use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{Phase, Session};
use crate::observability::Metrics;
use crate::service::TaskService;
use crate::task::{TaskState, TaskStatus};

/// Outcome of offering a snapshot to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Applied {
    Running,
    Terminal(TaskState),
    /// Stopped or no longer tracking; the snapshot was dropped
    Discarded,
}

/// State shared between a coordinator and its polling task
pub(super) struct Shared {
    pub(super) service: Arc<dyn TaskService>,
    pub(super) session: watch::Sender<Session>,
    pub(super) stop: CancellationToken,
    pub(super) metrics: Arc<Metrics>,
    pub(super) interval: Duration,
}

impl Shared {
    /// Modify the session unless stopped. The stop check happens under the
    /// session lock, so nothing lands after `halt` returns.
    pub(super) fn update(&self, modify: impl FnOnce(&mut Session) -> bool) -> bool {
        self.session.send_if_modified(|session| !self.stop.is_cancelled() && modify(session))
    }

    /// Replace the held snapshot with `snapshot` if still tracking.
    pub(super) fn apply(&self, snapshot: TaskStatus) -> Applied {
        let mut applied = Applied::Discarded;
        let mut regressed = None;
        self.update(|session| {
            if session.phase != Phase::Tracking {
                return false;
            }
            if let Some(previous) = &session.snapshot {
                if snapshot.progress < previous.progress {
                    regressed = Some((previous.progress, snapshot.progress));
                }
            }
            applied = match snapshot.state {
                state if state.is_terminal() => Applied::Terminal(state),
                _ => Applied::Running,
            };
            session.hold(snapshot, Utc::now());
            true
        });

        if let Some((from, to)) = regressed {
            debug!(from, to, "Reported progress went backwards");
        }

        match applied {
            Applied::Discarded => self.metrics.stale_discarded(),
            _ => self.metrics.snapshot_applied(),
        }
        applied
    }

    /// Stop polling. Waits out any apply already holding the session lock.
    pub(super) fn halt(&self) {
        self.session.send_if_modified(|_| {
            self.stop.cancel();
            false
        });
    }
}

/// Poll `task_id` every `interval` until terminal or stopped.
///
/// Sequential: the next sleep starts only after the previous fetch
/// resolved, so at most one request is in flight.
pub(super) async fn run(shared: Arc<Shared>, task_id: String) {
    debug!(%task_id, interval = ?shared.interval, "Polling started");

    loop {
        tokio::select! {
            biased;
            _ = shared.stop.cancelled() => break,
            _ = tokio::time::sleep(shared.interval) => {}
        }

        shared.metrics.poll_issued();
        let fetched = tokio::select! {
            biased;
            _ = shared.stop.cancelled() => break,
            fetched = shared.service.task_status(&task_id) => fetched,
        };

        match fetched {
            Ok(snapshot) => match shared.apply(snapshot) {
                Applied::Running => {}
                Applied::Terminal(state) => {
                    info!(%task_id, %state, "Task finished");
                    shared.halt();
                    break;
                }
                Applied::Discarded => {
                    debug!(%task_id, "Late poll result discarded");
                    break;
                }
            },
            Err(e) => {
                shared.metrics.poll_failed();
                warn!(%task_id, error = %e, "Status poll failed, keeping last snapshot");
            }
        }
    }

    debug!(%task_id, "Polling stopped");
}
