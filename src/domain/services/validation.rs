//! Row validation against the tenant catalog
//!
//! Shared by the CSV import and the JSON upsert. A row either validates into a
//! [`ValidatedLead`] with catalog references resolved, or yields every field
//! error found in it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domain::catalog::{CustomFieldDefinition, CustomFieldType, TenantCatalog};
use crate::domain::lead::{CustomFieldValue, CustomFields, MappedLead, ValidatedLead, normalize_email, normalize_identifier};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Minimum digit count for a plausible phone number.
const MIN_PHONE_DIGITS: usize = 7;

const NAIVE_DATETIME_FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];
const NAIVE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowErrorCode {
    InvalidEmail,
    InvalidPhone,
    InvalidStatus,
    InvalidCustomField,
    InvalidDate,
    InvalidOwner,
}

impl RowErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidPhone => "INVALID_PHONE",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidCustomField => "INVALID_CUSTOM_FIELD",
            Self::InvalidDate => "INVALID_DATE",
            Self::InvalidOwner => "INVALID_OWNER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub code: RowErrorCode,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, code: RowErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
}

/// Parse a follow-up timestamp. Offset-less forms are read as UTC.
pub fn parse_follow_up(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// Validates mapped rows for one tenant.
pub struct RowValidator<'a> {
    catalog: &'a TenantCatalog,
    /// Lower-cased member email → user id, resolved before validation.
    owners: &'a HashMap<String, String>,
    lenient_dates: bool,
}

impl<'a> RowValidator<'a> {
    pub fn new(catalog: &'a TenantCatalog, owners: &'a HashMap<String, String>, lenient_dates: bool) -> Self {
        Self {
            catalog,
            owners,
            lenient_dates,
        }
    }

    pub fn validate(&self, lead: &MappedLead) -> Result<ValidatedLead, Vec<FieldError>> {
        let mut errors = Vec::new();

        let email = lead.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            if !is_valid_email(email) {
                errors.push(FieldError::new("email", RowErrorCode::InvalidEmail, "Invalid email format"));
            }
        }

        let phone = lead.phone.as_deref().map(normalize_identifier);
        if let Some(phone) = &phone {
            if !is_valid_phone(phone) {
                errors.push(FieldError::new("phone", RowErrorCode::InvalidPhone, "Invalid phone format"));
            }
        }

        let status_id = match lead.status_label.as_deref() {
            Some(label) => match self.catalog.status_by_label(label) {
                Some(status) => Some(status.id.clone()),
                None => {
                    errors.push(FieldError::new(
                        "status_label",
                        RowErrorCode::InvalidStatus,
                        format!("Status \"{label}\" not found"),
                    ));
                    None
                }
            },
            None => None,
        };

        let next_follow_up_at = match lead.next_follow_up_at.as_deref() {
            Some(raw) => match parse_follow_up(raw) {
                Some(at) => Some(at),
                None if self.lenient_dates => None,
                None => {
                    errors.push(FieldError::new("next_follow_up_at", RowErrorCode::InvalidDate, "Invalid date"));
                    None
                }
            },
            None => None,
        };

        let owner_user_id = match lead.owner_email.as_deref() {
            Some(owner) => match self.owners.get(&normalize_email(owner)) {
                Some(user_id) => Some(user_id.clone()),
                None => {
                    errors.push(FieldError::new(
                        "owner_email",
                        RowErrorCode::InvalidOwner,
                        format!("Owner \"{owner}\" is not a member of this tenant"),
                    ));
                    None
                }
            },
            None => None,
        };

        let mut custom_fields = CustomFields::new();
        for (key, value) in &lead.custom_fields {
            let field_name = format!("custom.{key}");
            let Some(definition) = self.catalog.custom_field(key) else {
                errors.push(FieldError::new(
                    field_name,
                    RowErrorCode::InvalidCustomField,
                    format!("Custom field \"{key}\" not found"),
                ));
                continue;
            };
            match coerce_custom_value(value, definition) {
                Ok(Some(typed)) => {
                    custom_fields.insert(key.clone(), typed);
                }
                Ok(None) => {}
                Err(()) => errors.push(FieldError::new(
                    field_name,
                    RowErrorCode::InvalidCustomField,
                    format!("Invalid value for {}", definition.label),
                )),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedLead {
            full_name: lead.full_name.clone(),
            company: lead.company.clone(),
            email,
            phone,
            external_id: lead.external_id.as_deref().map(normalize_identifier),
            status_id,
            owner_user_id,
            next_follow_up_at,
            custom_fields,
        })
    }
}

/// Convert a raw custom value to its catalog type. `Ok(None)` means empty.
fn coerce_custom_value(value: &Value, definition: &CustomFieldDefinition) -> Result<Option<CustomFieldValue>, ()> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => return Err(()),
    };

    match definition.field_type {
        CustomFieldType::Text => Ok(Some(CustomFieldValue::Text(text))),
        CustomFieldType::Number => match value {
            Value::Number(n) => n.as_f64().map(|n| Some(CustomFieldValue::Number(n))).ok_or(()),
            _ => text
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|n| Some(CustomFieldValue::Number(n)))
                .ok_or(()),
        },
        CustomFieldType::Select => {
            if definition.options.is_empty() || definition.options.iter().any(|o| o == &text) {
                Ok(Some(CustomFieldValue::Text(text)))
            } else {
                Err(())
            }
        }
    }
}
