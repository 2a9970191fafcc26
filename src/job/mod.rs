//! Job descriptions and their submission

mod description;
mod submitter;
mod validation;

pub use description::{JobDescription, ProcessingConfig};
pub use submitter::{BatchSummary, JobSubmitter, SubmissionError, SubmissionResult, SubmitError};
pub use validation::{MAX_FRAMES_LIMIT, ValidationError, validate_job, validate_processing_config};
