//! Data Transfer Objects for the ingestion API
//!
//! Request bodies and response payloads in their camelCase wire form, plus
//! the conversions between them and domain types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::api_key::ApiKeyRecord;
use crate::domain::import_job::{ErrorRow, ImportJob, ImportStats};
use crate::domain::lead::{MappedLead, RawRow};
use crate::domain::services::dedupe::DedupeMode;
use crate::infrastructure::csv_parser::{CsvParseError, ParsedCsv};

// ============================================================================
// CSV import
// ============================================================================

/// What to do with a row that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    #[default]
    SkipRow,
    FailImport,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImportRequest {
    pub file_name: String,
    pub csv_text: String,
    pub mapping: BTreeMap<String, String>,
    pub dedupe_mode: DedupeMode,
    #[serde(default)]
    pub default_status_label: Option<String>,
    #[serde(default)]
    pub on_error: OnError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImportResponse {
    pub import_id: String,
    pub stats: ImportStats,
    pub errors_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobView {
    pub job: ImportJob,
    pub error_rows: Vec<ErrorRow>,
}

impl From<ImportJob> for ImportJobView {
    fn from(mut job: ImportJob) -> Self {
        let error_rows = std::mem::take(&mut job.error_rows);
        Self { job, error_rows }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportJobList {
    pub jobs: Vec<ImportJob>,
}

// ============================================================================
// CSV preview
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub csv_text: String,
    #[serde(default)]
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub errors: Vec<CsvParseError>,
}

impl From<ParsedCsv> for PreviewResponse {
    fn from(parsed: ParsedCsv) -> Self {
        Self {
            headers: parsed.headers,
            rows: parsed.rows,
            errors: parsed.errors,
        }
    }
}

// ============================================================================
// JSON bulk upsert
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLeadsRequest {
    pub tenant_id: String,
    pub campaign_id: String,
    pub dedupe_mode: DedupeMode,
    pub leads: Vec<UpsertLeadDto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLeadDto {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Status label, resolved against the tenant catalog.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub next_follow_up_at: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<BTreeMap<String, Value>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl From<UpsertLeadDto> for MappedLead {
    fn from(dto: UpsertLeadDto) -> Self {
        Self {
            full_name: non_empty(dto.full_name),
            company: non_empty(dto.company),
            email: non_empty(dto.email),
            phone: non_empty(dto.phone),
            external_id: non_empty(dto.external_id),
            status_label: non_empty(dto.status),
            next_follow_up_at: non_empty(dto.next_follow_up_at),
            owner_email: non_empty(dto.owner_email),
            custom_fields: dto.custom_fields.unwrap_or_default(),
        }
    }
}

/// A JSON lead that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadError {
    /// Position in the request's `leads` array.
    pub index: usize,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertLeadsResponse {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LeadError>,
}

// ============================================================================
// API keys
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKeyResponse {
    pub api_key: ApiKeyRecord,
    /// Returned exactly once.
    pub plaintext_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiKeyRequest {
    #[serde(alias = "is_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub api_key: ApiKeyRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyListResponse {
    pub api_keys: Vec<ApiKeyRecord>,
}

// ============================================================================
// Maintenance
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub deleted: u64,
    pub cutoff: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_request_defaults_to_skip_row() {
        let request: CsvImportRequest = serde_json::from_value(json!({
            "fileName": "leads.csv",
            "csvText": "Name\nAda",
            "mapping": {"Name": "full_name"},
            "dedupeMode": "none"
        }))
        .unwrap();
        assert_eq!(request.on_error, OnError::SkipRow);
        assert_eq!(request.dedupe_mode, DedupeMode::Disabled);
        assert!(request.default_status_label.is_none());
    }

    #[test]
    fn test_unknown_dedupe_mode_is_rejected() {
        let result: Result<UpsertLeadsRequest, _> = serde_json::from_value(json!({
            "tenantId": "t", "campaignId": "c", "dedupeMode": "fuzzy", "leads": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_json_lead_drops_blank_and_null_values() {
        let dto: UpsertLeadDto = serde_json::from_value(json!({
            "email": "  Ada@Example.com ",
            "company": "",
            "phone": null,
            "customFields": {"tier": "gold"}
        }))
        .unwrap();
        let mapped = MappedLead::from(dto);
        assert_eq!(mapped.email.as_deref(), Some("Ada@Example.com"));
        assert!(mapped.company.is_none());
        assert!(mapped.phone.is_none());
        assert_eq!(mapped.custom_fields["tier"], json!("gold"));
    }

    #[test]
    fn test_upsert_response_omits_empty_errors() {
        let response = UpsertLeadsResponse {
            created: 1,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"created": 1, "updated": 0, "skipped": 0})
        );
    }

    #[test]
    fn test_update_key_accepts_both_spellings() {
        let camel: UpdateApiKeyRequest = serde_json::from_value(json!({"isActive": false})).unwrap();
        let snake: UpdateApiKeyRequest = serde_json::from_value(json!({"is_active": true})).unwrap();
        assert!(!camel.is_active);
        assert!(snake.is_active);
    }
}
