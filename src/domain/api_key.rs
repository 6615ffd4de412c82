//! Tenant API key
//!
//! Only the peppered SHA-256 digest of a key is ever stored; the plaintext is
//! shown once at issue time.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
