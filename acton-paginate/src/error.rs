//! Error types and HTTP response conversion
//!
//! Request parameters never produce errors: missing or malformed values fall
//! back to defaults. Everything in this module describes failures of the
//! collaborators (query backend, cache store, spreadsheet writer) and is
//! surfaced to the caller as a single terminal error for the request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using the crate's error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pagination and export requests
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// The query backend failed while counting or fetching rows
    #[error("Query error: {0}")]
    Query(String),

    /// The cache store failed to read, write or invalidate an entry
    #[error("Cache error: {0}")]
    Cache(String),

    /// Redis error
    #[cfg(feature = "cache")]
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// Spreadsheet generation failed
    #[error("Export error: {0}")]
    Export(String),

    /// A cached value or row could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Error::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CONFIG_ERROR",
                        "Service is misconfigured",
                    ),
                )
            }

            Error::Query(msg) => {
                tracing::error!("Query error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "QUERY_ERROR",
                        "Failed to fetch data",
                    ),
                )
            }

            Error::Cache(msg) => {
                tracing::error!("Cache error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_code(
                        StatusCode::BAD_GATEWAY,
                        "CACHE_ERROR",
                        "Cache operation failed",
                    ),
                )
            }

            #[cfg(feature = "cache")]
            Error::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_code(
                        StatusCode::BAD_GATEWAY,
                        "CACHE_ERROR",
                        "Cache operation failed",
                    ),
                )
            }

            Error::Export(msg) => {
                tracing::error!("Export error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "EXPORT_ERROR",
                        "Failed to generate export",
                    ),
                )
            }

            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SERIALIZATION_ERROR",
                        "Failed to encode data",
                    ),
                )
            }

            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "IO_ERROR",
                        "Internal server error",
                    ),
                )
            }

            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_code(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error",
                    ),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Error::Export(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Error::Query("Connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => Error::Query("Connection pool is closed".to_string()),
            other => Error::Query(other.to_string()),
        }
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new(StatusCode::NOT_FOUND, "Table not found");
        assert_eq!(err.status, 404);
        assert_eq!(err.error, "Table not found");
        assert!(err.code.is_none());
    }

    #[test]
    fn test_error_response_with_code() {
        let err = ErrorResponse::with_code(
            StatusCode::INTERNAL_SERVER_ERROR,
            "QUERY_ERROR",
            "Failed to fetch data",
        );
        assert_eq!(err.status, 500);
        assert_eq!(err.code, Some("QUERY_ERROR".to_string()));
    }

    #[test]
    fn test_query_error_status() {
        let response = Error::Query("connection reset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cache_error_status() {
        let response = Error::Cache("store unavailable".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_display() {
        let err = Error::Export("sheet name too long".to_string());
        assert_eq!(err.to_string(), "Export error: sheet name too long");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
