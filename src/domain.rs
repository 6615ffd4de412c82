//! Domain layer for lead ingestion
//!
//! Entities, repository interfaces and the pure services (mapping, validation,
//! deduplication, merging) shared by the CSV import and JSON upsert paths.

pub mod api_key;
pub mod catalog;
pub mod import_job;
pub mod lead;
pub mod repositories;
pub mod services;

pub use api_key::ApiKeyRecord;
pub use catalog::{Campaign, CustomFieldDefinition, CustomFieldType, StatusDefinition, TenantCatalog};
pub use import_job::{ErrorRow, ImportJob, ImportJobStatus, ImportStats};
pub use lead::{CustomFieldValue, CustomFields, LeadRecord, MappedLead, RawRow, ValidatedLead};
