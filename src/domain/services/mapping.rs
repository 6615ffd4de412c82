//! CSV header → lead field mapping

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::domain::catalog::CustomFieldDefinition;
use crate::domain::lead::{MappedLead, RawRow};

const CUSTOM_PREFIX: &str = "custom.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardField {
    FullName,
    Company,
    Email,
    Phone,
    ExternalId,
    StatusLabel,
    NextFollowUpAt,
}

impl StandardField {
    pub const ALL: [Self; 7] = [
        Self::FullName,
        Self::Company,
        Self::Email,
        Self::Phone,
        Self::ExternalId,
        Self::StatusLabel,
        Self::NextFollowUpAt,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullName => "full_name",
            Self::Company => "company",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::ExternalId => "external_id",
            Self::StatusLabel => "status_label",
            Self::NextFollowUpAt => "next_follow_up_at",
        }
    }
}

/// Where a CSV column goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingTarget {
    Standard(StandardField),
    Custom(String),
    Ignore,
}

impl FromStr for MappingTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "ignore" {
            return Ok(Self::Ignore);
        }
        if let Some(key) = s.strip_prefix(CUSTOM_PREFIX) {
            return if key.is_empty() {
                Err(format!("Unknown target field \"{s}\""))
            } else {
                Ok(Self::Custom(key.to_string()))
            };
        }
        StandardField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .map(Self::Standard)
            .ok_or_else(|| format!("Unknown target field \"{s}\""))
    }
}

impl fmt::Display for MappingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(field) => f.write_str(field.as_str()),
            Self::Custom(key) => write!(f, "{CUSTOM_PREFIX}{key}"),
            Self::Ignore => f.write_str("ignore"),
        }
    }
}

/// Parsed header → target mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<(String, MappingTarget)>,
}

impl FieldMapping {
    /// Parse the wire form. Every unparseable target is reported.
    pub fn parse(raw: &BTreeMap<String, String>) -> Result<Self, Vec<String>> {
        let mut entries = Vec::with_capacity(raw.len());
        let mut errors = Vec::new();
        for (header, target) in raw {
            match target.parse::<MappingTarget>() {
                Ok(target) => entries.push((header.clone(), target)),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() { Ok(Self { entries }) } else { Err(errors) }
    }

    pub fn entries(&self) -> &[(String, MappingTarget)] {
        &self.entries
    }

    /// Check the mapping against the file's headers and the tenant catalog.
    ///
    /// Reports every unknown header, every unknown custom field and every
    /// standard field that more than one column claims.
    pub fn validate(&self, headers: &[String], custom_fields: &[CustomFieldDefinition]) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut used = HashSet::new();

        for (header, target) in &self.entries {
            if !headers.iter().any(|h| h == header) {
                errors.push(format!("CSV header \"{header}\" not found in file"));
                continue;
            }
            match target {
                MappingTarget::Ignore => {}
                MappingTarget::Custom(key) => {
                    if !custom_fields.iter().any(|f| &f.field_key == key) {
                        errors.push(format!("Custom field \"{key}\" not found"));
                    }
                }
                MappingTarget::Standard(field) => {
                    if !used.insert(*field) {
                        errors.push(format!("Standard field \"{}\" is mapped multiple times", field.as_str()));
                    }
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Project a raw row onto lead fields. Ignored columns and empty values
    /// are dropped.
    pub fn map_row(&self, row: &RawRow) -> MappedLead {
        let mut lead = MappedLead::default();
        for (header, target) in &self.entries {
            let Some(value) = row.get(header).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = value.to_string();
            match target {
                MappingTarget::Ignore => {}
                MappingTarget::Custom(key) => {
                    lead.custom_fields.insert(key.clone(), Value::String(value));
                }
                MappingTarget::Standard(field) => {
                    let slot = match field {
                        StandardField::FullName => &mut lead.full_name,
                        StandardField::Company => &mut lead.company,
                        StandardField::Email => &mut lead.email,
                        StandardField::Phone => &mut lead.phone,
                        StandardField::ExternalId => &mut lead.external_id,
                        StandardField::StatusLabel => &mut lead.status_label,
                        StandardField::NextFollowUpAt => &mut lead.next_follow_up_at,
                    };
                    *slot = Some(value);
                }
            }
        }
        lead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CustomFieldType;

    fn raw_mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(h, t)| (h.to_string(), t.to_string())).collect()
    }

    fn custom_field(key: &str) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: format!("cf-{key}"),
            tenant_id: "t1".into(),
            field_key: key.into(),
            label: key.into(),
            field_type: CustomFieldType::Text,
            options: vec![],
        }
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!("email".parse::<MappingTarget>(), Ok(MappingTarget::Standard(StandardField::Email)));
        assert_eq!("custom.tier".parse::<MappingTarget>(), Ok(MappingTarget::Custom("tier".into())));
        assert_eq!("ignore".parse::<MappingTarget>(), Ok(MappingTarget::Ignore));
        assert!("custom.".parse::<MappingTarget>().is_err());
        assert!("nickname".parse::<MappingTarget>().is_err());
        assert_eq!(MappingTarget::Custom("tier".into()).to_string(), "custom.tier");
    }

    #[test]
    fn test_parse_reports_all_unknown_targets() {
        let errors = FieldMapping::parse(&raw_mapping(&[("A", "nickname"), ("B", "age"), ("C", "email")])).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mapping = FieldMapping::parse(&raw_mapping(&[
            ("Mail", "email"),
            ("Email 2", "email"),
            ("Missing", "company"),
            ("Tier", "custom.tier"),
            ("Size", "custom.size"),
        ]))
        .unwrap();
        let errors = mapping
            .validate(&headers(&["Mail", "Email 2", "Tier", "Size"]), &[custom_field("tier")])
            .unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&"CSV header \"Missing\" not found in file".to_string()));
        assert!(errors.contains(&"Custom field \"size\" not found".to_string()));
        assert!(errors.contains(&"Standard field \"email\" is mapped multiple times".to_string()));
    }

    #[test]
    fn test_validate_accepts_good_mapping() {
        let mapping = FieldMapping::parse(&raw_mapping(&[("Name", "full_name"), ("Notes", "ignore")])).unwrap();
        assert!(mapping.validate(&headers(&["Name", "Notes"]), &[]).is_ok());
    }

    #[test]
    fn test_map_row_drops_empty_and_ignored() {
        let mapping = FieldMapping::parse(&raw_mapping(&[
            ("Name", "full_name"),
            ("Email", "email"),
            ("Notes", "ignore"),
            ("Tier", "custom.tier"),
        ]))
        .unwrap();
        let row: RawRow = [("Name", "Ann"), ("Email", ""), ("Notes", "vip"), ("Tier", "gold")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let lead = mapping.map_row(&row);
        assert_eq!(lead.full_name.as_deref(), Some("Ann"));
        assert!(lead.email.is_none());
        assert_eq!(lead.custom_fields.get("tier"), Some(&Value::String("gold".into())));
        assert_eq!(lead.custom_fields.len(), 1);
    }
}
