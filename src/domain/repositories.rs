//! Repository and store interfaces
//!
//! Trait definitions for every collaborator the ingestion use cases reach
//! through I/O. SQLite implementations live in the infrastructure layer.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::api_key::ApiKeyRecord;
use crate::domain::catalog::{Campaign, CustomFieldDefinition, StatusDefinition};
use crate::domain::import_job::ImportJob;
use crate::domain::lead::LeadRecord;
use crate::domain::services::dedupe::KeyKind;

/// Boundary a bulk key lookup is confined to.
#[derive(Debug, Clone, Copy)]
pub struct LookupScope<'a> {
    pub tenant_id: &'a str,
    pub campaign_id: &'a str,
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// All leads whose `kind` key is in `values`, most recently updated first.
    ///
    /// Email and phone lookups are confined to the campaign, external id
    /// lookups to the tenant.
    async fn find_by_keys(&self, scope: LookupScope<'_>, kind: KeyKind, values: &[String]) -> Result<Vec<LeadRecord>>;

    /// Insert one write chunk atomically.
    async fn insert_batch(&self, leads: &[LeadRecord]) -> Result<()>;

    /// Overwrite one chunk of existing leads atomically.
    async fn update_batch(&self, leads: &[LeadRecord]) -> Result<()>;

    async fn count_for_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<Option<Campaign>>;
    async fn list_statuses(&self, tenant_id: &str) -> Result<Vec<StatusDefinition>>;
    async fn list_custom_fields(&self, tenant_id: &str) -> Result<Vec<CustomFieldDefinition>>;
}

/// Tenant membership questions.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn is_tenant_admin(&self, tenant_id: &str, user_id: &str) -> Result<bool>;
    /// User id of the member with this (case-insensitive) email.
    async fn find_member_by_email(&self, tenant_id: &str, email: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait ImportJobRepository: Send + Sync {
    async fn create(&self, job: &ImportJob) -> Result<()>;
    async fn find_by_id(&self, job_id: &str) -> Result<Option<ImportJob>>;
    /// Newest first.
    async fn list_for_campaign(&self, tenant_id: &str, campaign_id: &str, limit: u32) -> Result<Vec<ImportJob>>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, key: &ApiKeyRecord) -> Result<()>;
    async fn find_active_by_hash(&self, tenant_id: &str, key_hash: &str) -> Result<Option<ApiKeyRecord>>;
    async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKeyRecord>>;
    /// Returns the updated key, or `None` when the tenant has no such key.
    async fn set_active(&self, tenant_id: &str, key_id: &str, is_active: bool) -> Result<Option<ApiKeyRecord>>;
    async fn touch_last_used(&self, key_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Outcome of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The caller owns the key and must `complete` or `release` it.
    Acquired,
    /// A finished request already stored this response.
    Replay(Value),
    /// Another request holds the key and has not finished.
    InFlight,
}

/// Per-tenant idempotency records keyed by the digest of the client key.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn reserve(&self, tenant_id: &str, key_hash: &str, now: DateTime<Utc>) -> Result<Reservation>;
    async fn complete(&self, tenant_id: &str, key_hash: &str, response: &Value) -> Result<()>;
    async fn release(&self, tenant_id: &str, key_hash: &str) -> Result<()>;
    /// Remove every record created before `cutoff`; returns how many.
    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole tokens left after this call.
    pub remaining: u32,
    /// Time until at least one token is available again.
    pub retry_after: Duration,
}

/// Token buckets keyed by caller scope, e.g. `ingestion:<api key id>`.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn try_acquire(&self, scope_key: &str, capacity: u32) -> Result<RateLimitDecision>;
}

/// Storage liveness probe for the health endpoint.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
