//! Configuration validation.
//!
//! Semantic checks on the file layer; serde has already handled syntax.
//! Returns every error found, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a valid socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("unknown log format {0:?} (expected \"pretty\" or \"json\")")]
    UnknownLogFormat(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            field: "timeouts.connect_secs",
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            field: "timeouts.request_secs",
        });
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::UnknownLogFormat(
            observability.log_format.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
