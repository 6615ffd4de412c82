//! HTTP transport (axum)
//!
//! `AppState` is the service container handed to every handler. It is built
//! once from `AppConfig` and an open `DatabaseConnection`.

pub mod envelope;
pub mod handlers;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::{Router, middleware};
use tracing::info;

use crate::application::{
    ApiKeyUseCases, ImportUseCases, IngestPipeline, MaintenanceUseCases, UpsertUseCases,
};
use crate::domain::repositories::{
    CatalogRepository, HealthCheck, IdempotencyStore, RateLimitStore, TenantDirectory,
};
use crate::infrastructure::api_key_repository::SqliteApiKeyRepository;
use crate::infrastructure::catalog_repository::{SqliteCatalogRepository, SqliteTenantDirectory};
use crate::infrastructure::config::{AppConfig, IdempotencyBackend};
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::idempotency_store::{InMemoryIdempotencyStore, SqliteIdempotencyStore};
use crate::infrastructure::import_job_repository::SqliteImportJobRepository;
use crate::infrastructure::lead_repository::SqliteLeadRepository;
use crate::infrastructure::rate_limiter::InMemoryRateLimitStore;

pub use envelope::{ApiSuccess, JsonBody, RequestId};
pub use session::{HeaderSessionResolver, PresentedApiKey, Principal, SessionResolver};

#[derive(Clone)]
pub struct AppState {
    pub imports: Arc<ImportUseCases>,
    pub upserts: Arc<UpsertUseCases>,
    pub api_keys: Arc<ApiKeyUseCases>,
    pub maintenance: Arc<MaintenanceUseCases>,
    pub health: Arc<dyn HealthCheck>,
    pub sessions: Arc<dyn SessionResolver>,
}

impl AppState {
    /// Wire repositories, stores and use cases over one SQLite pool.
    pub fn from_config(config: &AppConfig, db: &DatabaseConnection) -> Self {
        let pool = db.pool().clone();
        let settings = config.ingestion_settings();

        let catalog: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalogRepository::new(pool.clone()));
        let directory: Arc<dyn TenantDirectory> = Arc::new(SqliteTenantDirectory::new(pool.clone()));
        let idempotency: Arc<dyn IdempotencyStore> = match config.ingestion.idempotency_backend {
            IdempotencyBackend::Sqlite => Arc::new(SqliteIdempotencyStore::new(pool.clone())),
            IdempotencyBackend::Memory => Arc::new(InMemoryIdempotencyStore::new()),
        };
        let rate_limits: Arc<dyn RateLimitStore> = Arc::new(InMemoryRateLimitStore::new(Duration::from_millis(
            config.rate_limits.refill_interval_ms,
        )));

        let pipeline = IngestPipeline::new(
            Arc::new(SqliteLeadRepository::new(pool.clone())),
            settings.write_chunk_size,
        );
        let api_keys = ApiKeyUseCases::new(
            Arc::new(SqliteApiKeyRepository::new(pool.clone())),
            directory.clone(),
            config.security.api_key_pepper.clone(),
        );

        let imports = ImportUseCases::new(
            catalog.clone(),
            directory.clone(),
            Arc::new(SqliteImportJobRepository::new(pool)),
            pipeline.clone(),
            settings.clone(),
        );
        let upserts = UpsertUseCases::new(
            api_keys.clone(),
            catalog,
            directory,
            idempotency.clone(),
            rate_limits.clone(),
            pipeline,
            settings.clone(),
        );
        let maintenance =
            MaintenanceUseCases::new(idempotency, rate_limits, config.security.cron_secret.clone(), settings);

        info!(
            idempotency_backend = ?config.ingestion.idempotency_backend,
            chunk_size = config.ingestion.write_chunk_size,
            "🔧 services wired"
        );

        Self {
            imports: Arc::new(imports),
            upserts: Arc::new(upserts),
            api_keys: Arc::new(api_keys),
            maintenance: Arc::new(maintenance),
            health: Arc::new(db.clone()),
            sessions: Arc::new(HeaderSessionResolver::new(config.security.session_header.clone())),
        }
    }
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/leads/upsert", post(handlers::upsert_leads))
        .route(
            "/api/admin/tenants/:tenant_id/campaigns/:campaign_id/imports",
            post(handlers::import_csv).get(handlers::list_imports),
        )
        .route("/api/admin/imports/:import_id", get(handlers::get_import))
        .route("/api/imports/preview", post(handlers::preview_csv))
        .route(
            "/api/admin/tenants/:tenant_id/api-keys",
            post(handlers::create_api_key).get(handlers::list_api_keys),
        )
        .route(
            "/api/admin/tenants/:tenant_id/api-keys/:key_id",
            patch(handlers::update_api_key),
        )
        .route("/api/cron/idempotency/sweep", post(handlers::sweep_idempotency))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(middleware::from_fn(envelope::request_context))
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(router: Router, bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!("🚀 lead-intake listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
