//! Lead Intake - lead ingestion & deduplication engine
//!
//! Accepts leads from two channels, a spreadsheet-style CSV import driven by an
//! administrator and a machine-to-machine bulk JSON upsert authenticated by a
//! tenant API key, and writes them into a multi-tenant lead store while
//! collapsing duplicates by a configurable identity key.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

pub use infrastructure::config::{AppConfig, ConfigManager};
pub use infrastructure::http::build_router;
