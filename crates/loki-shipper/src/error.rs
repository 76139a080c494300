// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while building or validating a [`crate::config::ShipperConfig`].
///
/// All of them are fatal at startup: a shipper is never started with an
/// invalid configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LOKI_PUSH_URL is required")]
    MissingPushUrl,

    #[error("Invalid push URL '{url}': {reason}")]
    InvalidPushUrl { url: String, reason: String },

    #[error("Batch size must be greater than 0")]
    ZeroBatchSize,

    #[error("Flush interval must be greater than 0")]
    ZeroFlushInterval,

    #[error("Request timeout must be greater than 0")]
    ZeroTimeout,

    #[error("Invalid label name '{0}'")]
    InvalidLabel(String),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },
}

/// Failure of a single push to the backend.
///
/// The dispatcher reports these and drops the batch; they never stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Loki answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transport task failed: {0}")]
    Panicked(String),
}

impl TransportError {
    /// Returns the HTTP status code when the backend answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request { source, .. } => source.status(),
            Self::Status { status, .. } => Some(*status),
            Self::Payload(_) | Self::Query(_) | Self::Panicked(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Shipper has terminated, entry dropped")]
    Terminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::InvalidPushUrl {
            url: "ftp://loki".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid push URL 'ftp://loki': unsupported scheme"
        );
        assert_eq!(
            ConfigError::ZeroBatchSize.to_string(),
            "Batch size must be greater than 0"
        );
    }

    #[test]
    fn test_status_error_exposes_code() {
        let error = TransportError::Status {
            status: StatusCode::BAD_REQUEST,
            body: "entry out of order".to_string(),
        };
        assert_eq!(error.status(), Some(StatusCode::BAD_REQUEST));
        assert!(error.to_string().contains("entry out of order"));
    }

    #[test]
    fn test_shipper_error_wraps_config_error() {
        let error: ShipperError = ConfigError::ZeroFlushInterval.into();
        assert!(matches!(
            error,
            ShipperError::Config(ConfigError::ZeroFlushInterval)
        ));
        assert_eq!(error.to_string(), "Flush interval must be greater than 0");
    }
}
