use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::status::{TaskState, TaskStatus, elapsed_between};
use crate::humanize::format_elapsed;

const SHORT_ID_LEN: usize = 8;

/// Presentation-ready fields derived from a snapshot.
///
/// Built on demand; the snapshot it was derived from is never touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub short_id: String,
    pub state: TaskState,
    pub percent: u8,
    pub current_step: String,
    pub completed_steps: u32,
    pub total_steps: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub elapsed_text: String,
    pub error_message: Option<String>,
}

impl TaskView {
    /// Derive a view of `status` at `now`.
    ///
    /// `observed_end` freezes the clock for terminal snapshots that arrived
    /// without an `end_time`.
    pub fn derive(status: &TaskStatus, observed_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let ended_at = status.end_time.or(observed_end);
        let elapsed = elapsed_between(status.start_time, ended_at.unwrap_or(now));

        TaskView {
            task_id: status.task_id.clone(),
            short_id: short_id(&status.task_id),
            state: status.state,
            percent: status.percent_complete(),
            current_step: status.current_step.clone(),
            completed_steps: status.completed_steps,
            total_steps: status.total_steps,
            started_at: status.start_time,
            ended_at,
            elapsed,
            elapsed_text: format_elapsed(elapsed),
            error_message: status.error_message.clone(),
        }
    }

    pub fn steps_text(&self) -> String {
        format!("{}/{}", self.completed_steps, self.total_steps)
    }

    /// Cancellation is only offered while the task is still running.
    pub fn can_cancel(&self) -> bool {
        self.state == TaskState::Processing
    }
}

impl fmt::Display for TaskView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<10} {:>3}%  step {}  {}  ({})",
            self.short_id,
            self.state,
            self.percent,
            self.steps_text(),
            self.current_step,
            self.elapsed_text
        )?;
        if let Some(message) = &self.error_message {
            write!(f, "  error: {}", message)?;
        }
        Ok(())
    }
}

fn short_id(task_id: &str) -> String {
    task_id.chars().take(SHORT_ID_LEN).collect()
}
