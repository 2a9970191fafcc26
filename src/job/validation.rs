use thiserror::Error;

use super::description::{JobDescription, ProcessingConfig};

pub const MAX_FRAMES_LIMIT: u32 = 1000;

/// Local precondition failures; these never reach the network
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("video path is required")]
    MissingVideoPath,
    #[error("output directory is required")]
    MissingOutputDirectory,
    #[error("max_frames must be between 1 and {MAX_FRAMES_LIMIT}, got {0}")]
    MaxFramesOutOfRange(u32),
    #[error("{field} must be between 0 and 1, got {value}")]
    ThresholdOutOfRange { field: &'static str, value: f64 },
    #[error("batch_size must be positive")]
    InvalidBatchSize,
}

pub fn validate_job(job: &JobDescription) -> Result<(), ValidationError> {
    if job.video_path.trim().is_empty() {
        return Err(ValidationError::MissingVideoPath);
    }

    if job.output_directory.trim().is_empty() {
        return Err(ValidationError::MissingOutputDirectory);
    }

    validate_processing_config(&job.config)
}

pub fn validate_processing_config(config: &ProcessingConfig) -> Result<(), ValidationError> {
    if !(1..=MAX_FRAMES_LIMIT).contains(&config.max_frames) {
        return Err(ValidationError::MaxFramesOutOfRange(config.max_frames));
    }

    for (field, value) in config.thresholds() {
        // NaN fails the range check as well
        if !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::ThresholdOutOfRange { field, value });
        }
    }

    if config.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JobDescription {
        JobDescription::builder()
            .video_path("/videos/ep01.mp4")
            .output_directory("/datasets/ep01")
            .build()
    }

    #[test]
    fn validate_job_accepts_valid_description() {
        assert!(validate_job(&sample_job()).is_ok());
    }

    #[test]
    fn validate_job_rejects_blank_video_path() {
        let mut job = sample_job();
        job.video_path = "  ".to_string();

        let err = validate_job(&job).unwrap_err();
        assert_eq!(err, ValidationError::MissingVideoPath);
    }

    #[test]
    fn validate_job_rejects_empty_output_directory() {
        let mut job = sample_job();
        job.output_directory = String::new();

        let err = validate_job(&job).unwrap_err();
        assert_eq!(err, ValidationError::MissingOutputDirectory);
    }

    #[test]
    fn validate_processing_config_limits_max_frames() {
        let mut config = ProcessingConfig::default();
        config.max_frames = 0;
        assert!(matches!(
            validate_processing_config(&config),
            Err(ValidationError::MaxFramesOutOfRange(0))
        ));

        config.max_frames = 1001;
        assert!(validate_processing_config(&config).is_err());

        config.max_frames = 1000;
        assert!(validate_processing_config(&config).is_ok());
    }

    #[test]
    fn validate_processing_config_checks_thresholds() {
        let mut config = ProcessingConfig::default();
        config.general_tag_threshold = 1.5;

        let err = validate_processing_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ThresholdOutOfRange { field: "general_tag_threshold", .. }
        ));

        config.general_tag_threshold = f64::NAN;
        assert!(validate_processing_config(&config).is_err());
    }

    #[test]
    fn validate_processing_config_rejects_zero_batch() {
        let mut config = ProcessingConfig::default();
        config.batch_size = 0;
        assert_eq!(
            validate_processing_config(&config).unwrap_err(),
            ValidationError::InvalidBatchSize
        );
    }
}
