//! Infrastructure layer
//!
//! Configuration, logging, the SQLite store and its repositories, the
//! in-process rate limiter, CSV parsing, API-key hashing and the axum
//! transport.

pub mod api_key_repository;
pub mod catalog_repository;
pub mod config;
pub mod credentials;
pub mod csv_parser;
pub mod database_connection;
pub mod http;
pub mod idempotency_store;
pub mod import_job_repository;
pub mod lead_repository;
pub mod logging;
pub mod rate_limiter;

// Re-export commonly used items
pub use api_key_repository::SqliteApiKeyRepository;
pub use catalog_repository::{SqliteCatalogRepository, SqliteTenantDirectory};
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use http::{AppState, build_router, serve};
pub use idempotency_store::{InMemoryIdempotencyStore, SqliteIdempotencyStore};
pub use import_job_repository::SqliteImportJobRepository;
pub use lead_repository::SqliteLeadRepository;
pub use logging::{init_logging, init_logging_with_config, log_system_info};
pub use rate_limiter::InMemoryRateLimitStore;
