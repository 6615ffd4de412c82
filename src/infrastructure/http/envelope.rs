//! Response envelope and request context
//!
//! Every response body is `{ok, data|error, requestId}`. The request id is
//! taken from `x-request-id` when the caller sends one, otherwise generated,
//! and lives in a task-local for the duration of the handler so both the
//! success and the error path can stamp it without threading it through.

use std::convert::Infallible;
use std::time::Instant;

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::errors::IngestError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

tokio::task_local! {
    static CURRENT_REQUEST_ID: String;
}

/// Request id of the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn current_request_id() -> String {
    CURRENT_REQUEST_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| RequestId::generate().0)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self(current_request_id())))
    }
}

/// Middleware: assign the request id, open the request span and echo the
/// id back in the response header.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_header(request.headers().get(REQUEST_ID_HEADER));
    request.extensions_mut().insert(request_id.clone());

    let span = info_span!(
        "request",
        request_id = %request_id.0,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let started = Instant::now();
    let mut response = CURRENT_REQUEST_ID
        .scope(request_id.0.clone(), next.run(request))
        .instrument(span.clone())
        .await;

    let status = response.status();
    span.in_scope(|| {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if status.is_server_error() {
            warn!(status = status.as_u16(), elapsed_ms, "request failed");
        } else {
            info!(status = status.as_u16(), elapsed_ms, "request finished");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessBody<'a, T> {
    ok: bool,
    data: &'a T,
    request_id: String,
}

/// `{ok: true, data, requestId}` with a chosen status code.
#[derive(Debug)]
pub struct ApiSuccess<T> {
    status: StatusCode,
    data: T,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        let body = SuccessBody {
            ok: true,
            data: &self.data,
            request_id: current_request_id(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    ok: bool,
    error: ErrorDetail<'a>,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            match &self {
                Self::Internal(source) => error!("request aborted: {source:#}"),
                other => error!(code = other.code(), "request aborted: {other}"),
            }
        }

        let body = ErrorBody {
            ok: false,
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
            request_id: current_request_id(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Some(ms) = self.retry_after_ms() {
            let seconds = ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// JSON body extractor whose rejection is a `VALIDATION_ERROR` envelope.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = IngestError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(IngestError::validation_with(
                "Invalid request body",
                json!({ "reason": rejection.body_text() }),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::{Router, middleware};
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize, Serialize)]
    struct Echo {
        name: String,
    }

    fn router() -> Router {
        Router::new()
            .route("/ok", get(|| async { ApiSuccess::ok(json!({"hello": "world"})) }))
            .route(
                "/limited",
                get(|| async { Err::<ApiSuccess<()>, _>(IngestError::RateLimited { retry_after_ms: 1500 }) }),
            )
            .route(
                "/echo",
                post(|JsonBody(body): JsonBody<Echo>| async move { ApiSuccess::created(body) }),
            )
            .layer(middleware::from_fn(request_context))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope_echoes_request_id() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/ok")
                    .header(REQUEST_ID_HEADER, "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["hello"], "world");
        assert_eq!(body["requestId"], "req-123");
    }

    #[tokio::test]
    async fn test_generated_request_id_is_32_hex_chars() {
        let response = router()
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let header_id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        assert_eq!(header_id.len(), 32);
        assert!(header_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(json_body(response).await["requestId"], header_id.as_str());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = router()
            .oneshot(Request::builder().uri("/limited").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_validation_error() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "Invalid request body");
    }

    #[tokio::test]
    async fn test_created_status() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["data"]["name"], "x");
    }
}
