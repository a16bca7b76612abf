//! Error types surfaced at the HTTP boundary and at startup.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::llm::LlmError;

/// Errors returned by request handlers.
///
/// The `Display` text is exactly what the caller sees; upstream causes stay
/// in the source chain and are only logged.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required query parameter was missing or empty.
    #[error("Please provide both query and id parameters.")]
    BadRequest,

    /// The upstream model call failed.
    #[error("Failed to process the query.")]
    Upstream(#[source] LlmError),
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Fatal problems detected before the server starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// A required credential is absent or empty.
    #[error("{0} environment variable not set.")]
    MissingCredential(&'static str),

    /// Configuration sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A configured URL does not parse.
    #[error("invalid URL for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    /// A configured interval is zero or beyond the supported maximum.
    #[error("invalid interval for {key}: {value}s (expected 1..={max}s)")]
    InvalidInterval {
        key: &'static str,
        value: u64,
        max: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_bad_request_maps_to_400() {
        assert_eq!(AppError::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::BadRequest.to_string(),
            "Please provide both query and id parameters."
        );
    }

    #[test]
    fn test_upstream_hides_cause_but_keeps_source() {
        let err = AppError::Upstream(LlmError::Status {
            status: 503,
            body: "internal detail".to_string(),
        });

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Failed to process the query.");
        assert!(err.source().unwrap().to_string().contains("internal detail"));
    }
}
