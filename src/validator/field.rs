use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

use super::{PathValidator, ValidationResult};
use crate::service::FileKind;

/// What an input widget shows for its path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldState {
    pub path: String,
    pub result: ValidationResult,
    /// A check for `path` is waiting out the debounce or in flight
    pub pending: bool,
}

/// One path input with last-request-wins validation.
///
/// Every [`set_path`](Self::set_path) bumps a generation counter; a check
/// may only write its outcome while its generation is still the newest.
/// Superseded checks that are still debouncing never reach the network.
pub struct ValidatedField {
    validator: PathValidator,
    kind: FileKind,
    generation: AtomicU64,
    state: watch::Sender<FieldState>,
}

impl ValidatedField {
    pub(super) fn new(validator: PathValidator, kind: FileKind) -> Self {
        let (state, _) = watch::channel(FieldState::default());
        Self {
            validator,
            kind,
            generation: AtomicU64::new(0),
            state,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Record a new path and validate it.
    ///
    /// Returns the outcome if it was applied, or `None` when a newer
    /// `set_path` superseded this one first.
    pub async fn set_path(&self, path: impl Into<String>) -> Option<ValidationResult> {
        let path = path.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if path.trim().is_empty() {
            self.apply(generation, path, ValidationResult::Unknown, false);
            return Some(ValidationResult::Unknown);
        }

        if !self.apply(generation, path.clone(), ValidationResult::Unknown, true) {
            return self.superseded(&path);
        }

        let debounce = self.validator.debounce();
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
            if !self.is_current(generation) {
                return self.superseded(&path);
            }
        }

        let result = self.validator.validate(&path, self.kind).await;
        if self.apply(generation, path.clone(), result.clone(), false) {
            Some(result)
        } else {
            self.superseded(&path)
        }
    }

    /// Reset to the initial state, dropping any in-flight check.
    pub fn clear(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.apply(generation, String::new(), ValidationResult::Unknown, false);
    }

    pub fn current(&self) -> ValidationResult {
        self.state.borrow().result.clone()
    }

    pub fn state(&self) -> FieldState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FieldState> {
        self.state.subscribe()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Write state if `generation` is still the newest; checked under the
    /// channel lock.
    fn apply(&self, generation: u64, path: String, result: ValidationResult, pending: bool) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            *state = FieldState { path, result, pending };
            true
        })
    }

    fn superseded(&self, path: &str) -> Option<ValidationResult> {
        self.validator.metrics().validation_superseded();
        debug!(path, kind = %self.kind, "Validation superseded by a newer path");
        None
    }
}
