//! Application layer module
//!
//! Use cases that orchestrate the two ingestion paths, import-job reads,
//! API-key administration and idempotency housekeeping on top of the domain
//! services and repository traits.

pub mod api_key_use_cases;
pub mod batch_executor;
pub mod dto;
pub mod errors;
pub mod import_use_cases;
pub mod ingest_pipeline;
pub mod maintenance_use_cases;
pub mod upsert_use_cases;

pub use api_key_use_cases::ApiKeyUseCases;
pub use batch_executor::{BatchExecutor, BatchFailure, BatchReport};
pub use errors::IngestError;
pub use import_use_cases::ImportUseCases;
pub use ingest_pipeline::{IngestPipeline, IngestTarget};
pub use maintenance_use_cases::MaintenanceUseCases;
pub use upsert_use_cases::{UpsertOutcome, UpsertUseCases};

/// Tunables the use cases read, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub csv_max_bytes: usize,
    pub max_json_leads: usize,
    pub write_chunk_size: usize,
    pub preview_rows: usize,
    pub preview_max_rows: usize,
    /// Drop unparsable follow-up dates instead of rejecting the row.
    pub lenient_follow_up_dates: bool,
    pub ingestion_rate_capacity: u32,
    pub cron_rate_capacity: u32,
    pub idempotency_retention: chrono::Duration,
    pub import_history_limit: u32,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            csv_max_bytes: 5 * 1024 * 1024,
            max_json_leads: 1000,
            write_chunk_size: 200,
            preview_rows: 10,
            preview_max_rows: 100,
            lenient_follow_up_dates: false,
            ingestion_rate_capacity: 50,
            cron_rate_capacity: 10,
            idempotency_retention: chrono::Duration::hours(1),
            import_history_limit: 50,
        }
    }
}
