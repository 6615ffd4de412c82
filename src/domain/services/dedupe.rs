//! Identity keys and the batch-wide lead index
//!
//! A dedupe mode is an ordered list of key kinds. Each row is looked up by the
//! first kind it carries a value for; the index is filled from bulk lookups in
//! the same order, so earlier kinds take priority and an entry, once present,
//! is never overwritten.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::lead::{LeadRecord, ValidatedLead, normalize_email, normalize_identifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeMode {
    ExternalId,
    Email,
    Phone,
    EmailOrPhone,
    #[serde(rename = "none")]
    Disabled,
}

/// Where a key kind is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    Campaign,
    Tenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyKind {
    Email,
    Phone,
    ExternalId,
}

impl DedupeMode {
    /// Key kinds in priority order.
    pub const fn key_kinds(self) -> &'static [KeyKind] {
        match self {
            Self::ExternalId => &[KeyKind::ExternalId],
            Self::Email => &[KeyKind::Email],
            Self::Phone => &[KeyKind::Phone],
            Self::EmailOrPhone => &[KeyKind::Email, KeyKind::Phone],
            Self::Disabled => &[],
        }
    }

    /// The single key a row is matched by, if any.
    pub fn lookup_key(self, lead: &ValidatedLead) -> Option<LookupKey> {
        self.key_kinds()
            .iter()
            .find_map(|kind| kind.extract(lead).map(|value| LookupKey { kind: *kind, value }))
    }

    /// Distinct key values per kind across a batch, ready for bulk lookup.
    pub fn collect_key_values<'a, I>(self, leads: I) -> Vec<(KeyKind, Vec<String>)>
    where
        I: IntoIterator<Item = &'a ValidatedLead>,
    {
        let kinds = self.key_kinds();
        let mut sets: Vec<BTreeSet<String>> = vec![BTreeSet::new(); kinds.len()];
        for lead in leads {
            for (kind, set) in kinds.iter().zip(sets.iter_mut()) {
                if let Some(value) = kind.extract(lead) {
                    set.insert(value);
                }
            }
        }
        kinds
            .iter()
            .zip(sets)
            .filter(|(_, set)| !set.is_empty())
            .map(|(kind, set)| (*kind, set.into_iter().collect()))
            .collect()
    }
}

impl KeyKind {
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::ExternalId => "external_id",
        }
    }

    /// External ids are unique tenant-wide; email and phone per campaign.
    pub const fn scope(self) -> KeyScope {
        match self {
            Self::ExternalId => KeyScope::Tenant,
            Self::Email | Self::Phone => KeyScope::Campaign,
        }
    }

    pub fn extract(self, lead: &ValidatedLead) -> Option<String> {
        let raw = match self {
            Self::Email => lead.email.as_deref(),
            Self::Phone => lead.phone.as_deref(),
            Self::ExternalId => lead.external_id.as_deref(),
        };
        self.normalize(raw)
    }

    pub fn extract_record(self, record: &LeadRecord) -> Option<String> {
        let raw = match self {
            Self::Email => record.email.as_deref(),
            Self::Phone => record.phone.as_deref(),
            Self::ExternalId => record.external_id.as_deref(),
        };
        self.normalize(raw)
    }

    fn normalize(self, raw: Option<&str>) -> Option<String> {
        let value = match self {
            Self::Email => normalize_email(raw?),
            Self::Phone | Self::ExternalId => normalize_identifier(raw?),
        };
        (!value.is_empty()).then_some(value)
    }
}

/// Namespaced identity key, e.g. `email:ann@example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub kind: KeyKind,
    pub value: String,
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.value)
    }
}

/// Batch-wide map from identity key to lead id.
///
/// Holds the existing records fetched for the batch and is extended with
/// pending writes as rows are planned, so later rows of the same batch
/// resolve to leads created or updated earlier in it.
#[derive(Debug)]
pub struct LeadIndex {
    mode: DedupeMode,
    keys: HashMap<LookupKey, String>,
    existing: HashMap<String, LeadRecord>,
}

impl LeadIndex {
    pub fn new(mode: DedupeMode) -> Self {
        Self {
            mode,
            keys: HashMap::new(),
            existing: HashMap::new(),
        }
    }

    /// Build from bulk lookup results, given in key-kind priority order.
    ///
    /// Each result list must already be ordered most recently updated first;
    /// the first record claiming a key keeps it.
    pub fn from_lookups(mode: DedupeMode, lookups: Vec<(KeyKind, Vec<LeadRecord>)>) -> Self {
        let mut index = Self::new(mode);
        for (kind, records) in lookups {
            for record in records {
                if let Some(value) = kind.extract_record(&record) {
                    index
                        .keys
                        .entry(LookupKey { kind, value })
                        .or_insert_with(|| record.id.clone());
                }
                index.existing.entry(record.id.clone()).or_insert(record);
            }
        }
        index
    }

    pub fn lookup(&self, key: &LookupKey) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// Existing (already persisted) record by id.
    pub fn existing(&self, id: &str) -> Option<&LeadRecord> {
        self.existing.get(id)
    }

    /// Make a pending record reachable under every key the mode uses.
    pub fn register(&mut self, record: &LeadRecord) {
        for kind in self.mode.key_kinds() {
            if let Some(value) = kind.extract_record(record) {
                self.keys
                    .entry(LookupKey { kind: *kind, value })
                    .or_insert_with(|| record.id.clone());
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
