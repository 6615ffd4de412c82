//! Shared fixture: one in-memory store seeded with a tenant, a campaign, a
//! status catalog, an admin and an active API key.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use serde_json::Value;
use tower::ServiceExt;

use lead_intake::application::ApiKeyUseCases;
use lead_intake::application::dto::CreateApiKeyRequest;
use lead_intake::domain::catalog::{Campaign, CustomFieldDefinition, CustomFieldType, StatusDefinition};
use lead_intake::domain::lead::LeadRecord;
use lead_intake::domain::repositories::{LeadRepository, LookupScope};
use lead_intake::domain::services::dedupe::KeyKind;
use lead_intake::infrastructure::config::{AppConfig, IdempotencyBackend};
use lead_intake::infrastructure::http::{AppState, build_router};
use lead_intake::infrastructure::{
    DatabaseConnection, SqliteApiKeyRepository, SqliteCatalogRepository, SqliteLeadRepository, SqliteTenantDirectory,
};

pub const TENANT_ID: &str = "6f1c2a4e-8b3d-4f7a-9c21-0d5e6b7a8c90";
pub const CAMPAIGN_ID: &str = "a3b9e0d2-51c4-4e8f-b6a7-2c9d0e1f3a45";
pub const OTHER_TENANT_ID: &str = "0b7e5c1d-2f3a-4b6c-8d9e-1a2b3c4d5e6f";
pub const ADMIN_USER: &str = "u-admin";
pub const REP_USER: &str = "u-rep";
pub const PEPPER: &str = "test-pepper";
pub const CRON_SECRET: &str = "cron-s3cret";

pub struct TestApp {
    pub db: DatabaseConnection,
    pub state: AppState,
    pub config: AppConfig,
    pub api_key: String,
    pub leads: Arc<SqliteLeadRepository>,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".into();
    config.security.api_key_pepper = PEPPER.into();
    config.security.cron_secret = Some(CRON_SECRET.into());
    config.ingestion.idempotency_backend = IdempotencyBackend::Sqlite;
    config
}

pub async fn seeded_db() -> anyhow::Result<DatabaseConnection> {
    let db = DatabaseConnection::new("sqlite::memory:").await?;
    db.migrate().await?;

    let catalog = SqliteCatalogRepository::new(db.pool().clone());
    catalog
        .create_campaign(&Campaign {
            id: CAMPAIGN_ID.into(),
            tenant_id: TENANT_ID.into(),
            name: "Spring outreach".into(),
        })
        .await?;
    for (id, label, sort_order, is_default) in [("st-new", "New", 0, true), ("st-won", "Won", 1, false)] {
        catalog
            .create_status(&StatusDefinition {
                id: id.into(),
                tenant_id: TENANT_ID.into(),
                label: label.into(),
                sort_order,
                is_default,
            })
            .await?;
    }
    catalog
        .create_custom_field(&CustomFieldDefinition {
            id: "cf-budget".into(),
            tenant_id: TENANT_ID.into(),
            field_key: "budget".into(),
            label: "Budget".into(),
            field_type: CustomFieldType::Number,
            options: Vec::new(),
        })
        .await?;
    catalog.add_member(TENANT_ID, ADMIN_USER, "admin@example.com", "admin").await?;
    catalog.add_member(TENANT_ID, REP_USER, "rep@example.com", "member").await?;
    Ok(db)
}

pub async fn issue_key(db: &DatabaseConnection) -> anyhow::Result<String> {
    let keys = ApiKeyUseCases::new(
        Arc::new(SqliteApiKeyRepository::new(db.pool().clone())),
        Arc::new(SqliteTenantDirectory::new(db.pool().clone())),
        PEPPER,
    );
    let issued = keys
        .issue(ADMIN_USER, TENANT_ID, CreateApiKeyRequest { name: "crm sync".into() })
        .await?;
    Ok(issued.plaintext_key)
}

impl TestApp {
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        let db = seeded_db().await?;
        let api_key = issue_key(&db).await?;
        let state = AppState::from_config(&config, &db);
        let leads = Arc::new(SqliteLeadRepository::new(db.pool().clone()));
        Ok(Self {
            db,
            state,
            config,
            api_key,
            leads,
        })
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.config.server.body_limit_bytes)
    }

    pub async fn lead_count(&self) -> anyhow::Result<u64> {
        self.leads.count_for_campaign(TENANT_ID, CAMPAIGN_ID).await
    }

    pub async fn leads_by_email(&self, email: &str) -> anyhow::Result<Vec<LeadRecord>> {
        self.leads
            .find_by_keys(
                LookupScope {
                    tenant_id: TENANT_ID,
                    campaign_id: CAMPAIGN_ID,
                },
                KeyKind::Email,
                &[email.to_string()],
            )
            .await
    }

    /// Send a request through the router and decode the envelope.
    pub async fn call(&self, request: Request<Body>) -> (Response<Body>, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (Response::from_parts(parts, Body::empty()), json)
    }
}

/// Build a request; `body` is sent as JSON when present.
pub fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
