use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::task::{TaskState, TaskStatus, TaskView};

/// Where a coordinator is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Task is pending or processing on the service
    Tracking,
    /// A terminal snapshot was applied; nothing changes after this
    Finished(TaskState),
}

impl Phase {
    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Finished(_))
    }
}

/// Everything a coordinator knows about its task.
///
/// `snapshot` is always the last full record received (or the local
/// cancellation record); it is replaced, never patched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub task_id: Option<String>,
    pub phase: Phase,
    pub snapshot: Option<TaskStatus>,
    /// When the client first held a terminal snapshot that had no `end_time`
    pub observed_end: Option<DateTime<Utc>>,
}

impl Session {
    /// Elapsed run time at `now`; `None` before the first snapshot.
    pub fn derive_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.view(now).map(|view| view.elapsed)
    }

    pub fn view(&self, now: DateTime<Utc>) -> Option<TaskView> {
        self.snapshot
            .as_ref()
            .map(|snapshot| TaskView::derive(snapshot, self.observed_end, now))
    }

    pub(super) fn hold(&mut self, snapshot: TaskStatus, now: DateTime<Utc>) {
        if snapshot.state.is_terminal() {
            self.phase = Phase::Finished(snapshot.state);
            self.observed_end = match snapshot.end_time {
                Some(_) => None,
                None => Some(now),
            };
        }
        self.snapshot = Some(snapshot);
    }
}
