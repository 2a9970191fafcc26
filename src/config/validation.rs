use super::models::Config;
use crate::humanize::HumanDuration;
use crate::job::{self, validate_processing_config};
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid service base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("Invalid processing defaults: {0}")]
    InvalidProcessing(#[from] job::ValidationError),

    #[error("Invalid logging filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_service(config)?;
    validate_durations(config)?;
    validate_processing_config(&config.processing)?;
    validate_logging(config)?;
    Ok(())
}

/// Base URL must be an absolute http(s) URL
fn validate_service(config: &Config) -> Result<(), ValidationError> {
    let raw = &config.service.base_url;
    let invalid = |reason: String| ValidationError::InvalidBaseUrl {
        url: raw.clone(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(())
}

fn validate_durations(config: &Config) -> Result<(), ValidationError> {
    let durations: [(&'static str, HumanDuration); 3] = [
        ("service.request_timeout", config.service.request_timeout),
        ("service.connect_timeout", config.service.connect_timeout),
        ("polling.interval", config.polling.interval),
    ];

    // validation.debounce may be zero
    for (field, value) in durations {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration { field });
        }
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<(), ValidationError> {
    tracing_subscriber::EnvFilter::try_new(&config.logging.filter)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidLogFilter {
            filter: config.logging.filter.clone(),
            reason: e.to_string(),
        })
}
