//! Remote validation of user-entered file paths
//!
//! [`PathValidator::validate`] is the one-shot check. [`ValidatedField`]
//! wraps it for an input that changes over time: it debounces edits and
//! applies only the outcome of the most recently issued request.

mod field;

pub use field::{FieldState, ValidatedField};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::observability::Metrics;
use crate::service::{FileKind, TaskService};

const GENERIC_FAILURE: &str = "failed to validate file path";

/// Tri-state validity of a path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationResult {
    /// Nothing entered yet, or a check is still in flight
    #[default]
    Unknown,
    Valid,
    Invalid { message: Option<String> },
}

impl ValidationResult {
    pub fn is_valid(&self) -> Option<bool> {
        match self {
            ValidationResult::Unknown => None,
            ValidationResult::Valid => Some(true),
            ValidationResult::Invalid { .. } => Some(false),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ValidationResult::Invalid { message } => message.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct PathValidator {
    service: Arc<dyn TaskService>,
    debounce: Duration,
    metrics: Arc<Metrics>,
}

impl PathValidator {
    pub fn new(service: Arc<dyn TaskService>) -> Self {
        Self {
            service,
            debounce: Duration::ZERO,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Quiet period a [`ValidatedField`] waits before checking a new path.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Check `path` against `kind` on the service.
    ///
    /// Blank input stays [`ValidationResult::Unknown`] without a remote
    /// call. Any failure to get an answer is reported as invalid.
    pub async fn validate(&self, path: &str, kind: FileKind) -> ValidationResult {
        if path.trim().is_empty() {
            return ValidationResult::Unknown;
        }

        match self.service.validate_path(path, kind).await {
            Ok(check) if check.valid => {
                debug!(path, %kind, "Path accepted");
                ValidationResult::Valid
            }
            Ok(check) => {
                debug!(path, %kind, error = ?check.error, "Path rejected");
                ValidationResult::Invalid { message: check.error }
            }
            Err(e) => {
                warn!(path, %kind, error = %e, "Path validation request failed");
                ValidationResult::Invalid {
                    message: Some(GENERIC_FAILURE.to_string()),
                }
            }
        }
    }

    /// New input field checked against `kind`.
    pub fn field(&self, kind: FileKind) -> ValidatedField {
        ValidatedField::new(self.clone(), kind)
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
