//! Lead entities
//!
//! A lead moves through three shapes on its way into the store:
//! `RawRow`/JSON input → [`MappedLead`] (canonical field names, raw values) →
//! [`ValidatedLead`] (typed, catalog-resolved) → [`LeadRecord`] (persisted).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One CSV data row keyed by trimmed header name.
pub type RawRow = BTreeMap<String, String>;

/// Tenant-defined custom attributes after validation against the catalog.
pub type CustomFields = BTreeMap<String, CustomFieldValue>;

/// Typed custom attribute value.
///
/// `select` values are stored as text; the catalog guarantees membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomFieldValue {
    Number(f64),
    Text(String),
}

impl CustomFieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl std::fmt::Display for CustomFieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A lead in canonical field names, values still unvalidated.
///
/// Empty input values never reach this struct: the mapper and the JSON
/// adapter drop them, so `Some` always carries a non-empty, trimmed string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappedLead {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_follow_up_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, Value>,
}

impl MappedLead {
    /// Snapshot used for `ErrorRow::data`.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A lead that passed validation and had catalog references resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedLead {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub external_id: Option<String>,
    pub status_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub custom_fields: CustomFields,
}

/// Persisted lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: String,
    pub tenant_id: String,
    pub campaign_id: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub external_id: Option<String>,
    pub status_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub custom_fields: CustomFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lower-case and trim an email for keying and storage.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trim a phone or external id for keying and storage.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_field_value_untagged_serde() {
        let fields: CustomFields = serde_json::from_str(r#"{"budget": 1200.5, "tier": "gold"}"#).unwrap();
        assert_eq!(fields["budget"], CustomFieldValue::Number(1200.5));
        assert_eq!(fields["tier"], CustomFieldValue::Text("gold".into()));
        assert_eq!(fields["tier"].as_text(), Some("gold"));
    }

    #[test]
    fn test_mapped_lead_snapshot_omits_empty_fields() {
        let lead = MappedLead {
            email: Some("a@x.com".into()),
            ..Default::default()
        };
        assert_eq!(lead.to_json(), serde_json::json!({"email": "a@x.com"}));
    }

    #[test]
    fn test_normalizers() {
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
        assert_eq!(normalize_identifier(" +1 555 "), "+1 555");
    }
}
