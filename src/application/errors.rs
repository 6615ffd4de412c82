//! Request-level error taxonomy
//!
//! Row problems are values and never show up here. Everything in this enum
//! aborts the request and maps to one wire error code.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{message}")]
    Validation { message: String, details: Option<Value> },

    #[error("Failed to parse CSV")]
    CsvParse { details: Value },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("A request with this idempotency key is already being processed")]
    IdempotencyConflict,

    #[error("{message}")]
    Persistence { message: String, details: Value },

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_ms: u64 },

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl IngestError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::CsvParse { .. } => "CSV_PARSE_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::Persistence { .. } | Self::Internal(_) => "INTERNAL_ERROR",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
        }
    }

    /// HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::CsvParse { .. } => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::IdempotencyConflict => 409,
            Self::RateLimited { .. } => 429,
            Self::Persistence { .. } | Self::Internal(_) => 500,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation { details, .. } => details.as_ref(),
            Self::CsvParse { details } | Self::Persistence { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (IngestError::validation("bad"), "VALIDATION_ERROR", 400),
            (IngestError::CsvParse { details: json!([]) }, "CSV_PARSE_ERROR", 400),
            (IngestError::Unauthorized("no".into()), "UNAUTHORIZED", 401),
            (IngestError::Forbidden("no".into()), "FORBIDDEN", 403),
            (IngestError::NotFound("gone".into()), "NOT_FOUND", 404),
            (IngestError::IdempotencyConflict, "IDEMPOTENCY_CONFLICT", 409),
            (IngestError::RateLimited { retry_after_ms: 10 }, "RATE_LIMIT_EXCEEDED", 429),
            (
                IngestError::Persistence {
                    message: "chunk 2 failed".into(),
                    details: json!({"created": 200}),
                },
                "INTERNAL_ERROR",
                500,
            ),
            (IngestError::Internal(anyhow::anyhow!("boom")), "INTERNAL_ERROR", 500),
        ];
        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.status_code(), status);
        }
    }

    #[test]
    fn test_internal_error_exposes_only_the_outer_message() {
        let inner = anyhow::anyhow!("disk I/O error").context("Failed to insert leads");
        let error = IngestError::from(inner);
        assert_eq!(error.to_string(), "Failed to insert leads");
        assert!(error.details().is_none());
    }
}
