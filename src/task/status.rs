use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state reported by the processing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Full snapshot of a task as returned by `GET /status/{task_id}`.
///
/// Snapshots are replaced wholesale; the client never merges two of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    #[serde(rename = "status")]
    pub state: TaskState,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub completed_steps: u32,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TaskStatus {
    /// Elapsed run time at `now`.
    ///
    /// Uses `end_time` when the service recorded one, otherwise `now`.
    /// Clock skew that would produce a negative span yields zero.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.start_time, self.end_time.unwrap_or(now))
    }

    /// Progress as a whole percentage in `0..=100`.
    pub fn percent_complete(&self) -> u8 {
        if !self.progress.is_finite() {
            return 0;
        }
        (self.progress * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Replacement record for a locally confirmed cancellation.
    ///
    /// Keeps the server-reported progress fields and stamps `end_time`
    /// only when the service had not set one.
    pub fn cancelled_at(&self, now: DateTime<Utc>) -> TaskStatus {
        TaskStatus {
            state: TaskState::Cancelled,
            end_time: self.end_time.or(Some(now)),
            error_message: None,
            ..self.clone()
        }
    }
}

pub(crate) fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or(Duration::ZERO)
}

/// Parse an ISO-8601 timestamp, with or without offset.
///
/// The service emits naive timestamps (`2024-05-01T10:00:00.123456`);
/// those are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(with_offset) => Ok(with_offset.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc()),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
