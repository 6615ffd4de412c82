//! Tenant catalog: campaigns, status definitions and custom field definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
}

/// Named pipeline stage a lead can be in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub id: String,
    pub tenant_id: String,
    pub label: String,
    pub sort_order: i64,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldType {
    Text,
    Number,
    Select,
}

impl CustomFieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Select => "select",
        }
    }
}

impl std::str::FromStr for CustomFieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "select" => Ok(Self::Select),
            other => Err(format!("unknown custom field type: {other}")),
        }
    }
}

/// Tenant-defined extra attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: String,
    pub tenant_id: String,
    pub field_key: String,
    pub label: String,
    pub field_type: CustomFieldType,
    /// Allowed values for `select`; empty means unrestricted.
    pub options: Vec<String>,
}

/// Status and custom field definitions of one tenant, loaded once per request.
#[derive(Debug, Clone, Default)]
pub struct TenantCatalog {
    pub statuses: Vec<StatusDefinition>,
    pub custom_fields: Vec<CustomFieldDefinition>,
}

impl TenantCatalog {
    pub fn new(statuses: Vec<StatusDefinition>, custom_fields: Vec<CustomFieldDefinition>) -> Self {
        Self { statuses, custom_fields }
    }

    /// Case-insensitive status lookup by label.
    pub fn status_by_label(&self, label: &str) -> Option<&StatusDefinition> {
        let wanted = label.trim().to_lowercase();
        self.statuses.iter().find(|s| s.label.to_lowercase() == wanted)
    }

    pub fn custom_field(&self, field_key: &str) -> Option<&CustomFieldDefinition> {
        self.custom_fields.iter().find(|f| f.field_key == field_key)
    }
}
