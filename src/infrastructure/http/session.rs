//! Session boundary
//!
//! Human sign-in happens upstream. The gateway in front of this service
//! forwards the authenticated user id in a header; tenant-admin checks are
//! left to the use cases.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::application::errors::IngestError;
use crate::infrastructure::http::AppState;

pub const DEFAULT_SESSION_HEADER: &str = "x-user-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// The signed-in user behind an admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

pub trait SessionResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<Principal, IngestError>;
}

/// Trusts a user id header set by the fronting gateway.
#[derive(Debug, Clone)]
pub struct HeaderSessionResolver {
    header: String,
}

impl HeaderSessionResolver {
    pub fn new(header: impl Into<String>) -> Self {
        let header = header.into().trim().to_ascii_lowercase();
        Self {
            header: if header.is_empty() {
                DEFAULT_SESSION_HEADER.to_string()
            } else {
                header
            },
        }
    }
}

impl Default for HeaderSessionResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_HEADER)
    }
}

impl SessionResolver for HeaderSessionResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Principal, IngestError> {
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|user_id| Principal {
                user_id: user_id.to_string(),
            })
            .ok_or_else(|| IngestError::Unauthorized("Not authenticated".into()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = IngestError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.sessions.resolve(&parts.headers)
    }
}

/// Machine credential from `x-api-key`, checked for presence before the body
/// is read. Matching it against the tenant happens in the use case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedApiKey(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PresentedApiKey {
    type Rejection = IngestError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|key| Self(key.to_string()))
            .ok_or_else(|| IngestError::Unauthorized("x-api-key header required".into()))
    }
}
