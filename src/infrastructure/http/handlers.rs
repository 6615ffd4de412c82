//! Route handlers
//!
//! Thin adapters: pull identity and body out of the request, call one use
//! case, wrap the result in the envelope.

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::IntoResponse;
use chrono::Utc;

use crate::application::dto::{
    ApiKeyListResponse, ApiKeyResponse, CreateApiKeyRequest, CreatedApiKeyResponse, CsvImportRequest,
    CsvImportResponse, HealthResponse, ImportJobList, ImportJobView, PreviewRequest, PreviewResponse,
    SweepResponse, UpdateApiKeyRequest, UpsertLeadsRequest,
};
use crate::application::errors::IngestError;
use crate::infrastructure::http::AppState;
use crate::infrastructure::http::envelope::{ApiSuccess, JsonBody};
use crate::infrastructure::http::session::{PresentedApiKey, Principal};

pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
pub const IDEMPOTENT_REPLAY_HEADER: &str = "x-idempotent-replay";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

type ApiResult<T> = Result<ApiSuccess<T>, IngestError>;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Authorization: Bearer <secret>`, else the `x-cron-secret` header.
fn cron_secret(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| header_str(headers, CRON_SECRET_HEADER))
        .map(str::trim)
}

pub async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    state
        .health
        .ping()
        .await
        .context("Database connection failed")?;
    Ok(ApiSuccess::ok(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
    }))
}

pub async fn upsert_leads(
    State(state): State<AppState>,
    PresentedApiKey(api_key): PresentedApiKey,
    headers: HeaderMap,
    JsonBody(request): JsonBody<UpsertLeadsRequest>,
) -> Result<impl IntoResponse, IngestError> {
    let outcome = state
        .upserts
        .upsert(
            Some(api_key.as_str()),
            header_str(&headers, IDEMPOTENCY_KEY_HEADER),
            request,
        )
        .await?;

    let mut response_headers = HeaderMap::new();
    if outcome.is_replay() {
        response_headers.insert(
            HeaderName::from_static(IDEMPOTENT_REPLAY_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    Ok((response_headers, ApiSuccess::ok(outcome.into_value())))
}

pub async fn import_csv(
    State(state): State<AppState>,
    principal: Principal,
    Path((tenant_id, campaign_id)): Path<(String, String)>,
    JsonBody(request): JsonBody<CsvImportRequest>,
) -> ApiResult<CsvImportResponse> {
    let response = state
        .imports
        .import_csv(&principal.user_id, &tenant_id, &campaign_id, request)
        .await?;
    Ok(ApiSuccess::created(response))
}

pub async fn list_imports(
    State(state): State<AppState>,
    principal: Principal,
    Path((tenant_id, campaign_id)): Path<(String, String)>,
) -> ApiResult<ImportJobList> {
    let jobs = state
        .imports
        .list_jobs(&principal.user_id, &tenant_id, &campaign_id)
        .await?;
    Ok(ApiSuccess::ok(jobs))
}

pub async fn get_import(
    State(state): State<AppState>,
    principal: Principal,
    Path(import_id): Path<String>,
) -> ApiResult<ImportJobView> {
    let job = state.imports.get_job(&principal.user_id, &import_id).await?;
    Ok(ApiSuccess::ok(job))
}

pub async fn preview_csv(
    State(state): State<AppState>,
    _principal: Principal,
    JsonBody(request): JsonBody<PreviewRequest>,
) -> ApiResult<PreviewResponse> {
    Ok(ApiSuccess::ok(state.imports.preview(&request)?))
}

pub async fn create_api_key(
    State(state): State<AppState>,
    principal: Principal,
    Path(tenant_id): Path<String>,
    JsonBody(request): JsonBody<CreateApiKeyRequest>,
) -> ApiResult<CreatedApiKeyResponse> {
    let created = state
        .api_keys
        .issue(&principal.user_id, &tenant_id, request)
        .await?;
    Ok(ApiSuccess::created(created))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    principal: Principal,
    Path(tenant_id): Path<String>,
) -> ApiResult<ApiKeyListResponse> {
    Ok(ApiSuccess::ok(state.api_keys.list(&principal.user_id, &tenant_id).await?))
}

pub async fn update_api_key(
    State(state): State<AppState>,
    principal: Principal,
    Path((tenant_id, key_id)): Path<(String, String)>,
    JsonBody(request): JsonBody<UpdateApiKeyRequest>,
) -> ApiResult<ApiKeyResponse> {
    let updated = state
        .api_keys
        .set_active(&principal.user_id, &tenant_id, &key_id, request.is_active)
        .await?;
    Ok(ApiSuccess::ok(updated))
}

pub async fn sweep_idempotency(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<SweepResponse> {
    let swept = state.maintenance.sweep_idempotency(cron_secret(&headers)).await?;
    Ok(ApiSuccess::ok(swept))
}

pub async fn not_found() -> IngestError {
    IngestError::NotFound("Route not found".into())
}
