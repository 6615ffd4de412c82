//! Machine-to-machine bulk JSON upsert
//!
//! Admission order: API key, rate limit, idempotency reservation. Only then is
//! the campaign checked and the batch processed. A reserved idempotency key is
//! completed with the response on success and released on any error.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::IngestionSettings;
use crate::application::api_key_use_cases::ApiKeyUseCases;
use crate::application::dto::{LeadError, UpsertLeadsRequest, UpsertLeadsResponse};
use crate::application::errors::IngestError;
use crate::application::ingest_pipeline::{IngestPipeline, IngestTarget};
use crate::domain::catalog::TenantCatalog;
use crate::domain::lead::{MappedLead, normalize_email};
use crate::domain::repositories::{CatalogRepository, IdempotencyStore, RateLimitStore, Reservation, TenantDirectory};
use crate::domain::services::validation::RowValidator;
use crate::infrastructure::credentials::hash_idempotency_key;

/// Result of an admitted upsert request.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Completed(UpsertLeadsResponse),
    /// Stored response of an earlier request with the same idempotency key.
    Replayed(Value),
}

impl UpsertOutcome {
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed(_))
    }

    /// Response body as sent on the wire.
    pub fn into_value(self) -> Value {
        match self {
            Self::Completed(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Self::Replayed(value) => value,
        }
    }
}

pub struct UpsertUseCases {
    api_keys: ApiKeyUseCases,
    catalog: Arc<dyn CatalogRepository>,
    directory: Arc<dyn TenantDirectory>,
    idempotency: Arc<dyn IdempotencyStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    pipeline: IngestPipeline,
    settings: IngestionSettings,
}

impl UpsertUseCases {
    pub fn new(
        api_keys: ApiKeyUseCases,
        catalog: Arc<dyn CatalogRepository>,
        directory: Arc<dyn TenantDirectory>,
        idempotency: Arc<dyn IdempotencyStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        pipeline: IngestPipeline,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            api_keys,
            catalog,
            directory,
            idempotency,
            rate_limits,
            pipeline,
            settings,
        }
    }

    fn check_shape(&self, request: &UpsertLeadsRequest) -> Result<(), IngestError> {
        if Uuid::parse_str(&request.tenant_id).is_err() {
            return Err(IngestError::validation("tenantId must be a UUID"));
        }
        if Uuid::parse_str(&request.campaign_id).is_err() {
            return Err(IngestError::validation("campaignId must be a UUID"));
        }
        if request.leads.len() > self.settings.max_json_leads {
            return Err(IngestError::validation(format!(
                "At most {} leads per request ({} given)",
                self.settings.max_json_leads,
                request.leads.len()
            )));
        }
        Ok(())
    }

    pub async fn upsert(
        &self,
        api_key: Option<&str>,
        idempotency_key: Option<&str>,
        request: UpsertLeadsRequest,
    ) -> Result<UpsertOutcome, IngestError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| IngestError::Unauthorized("x-api-key header required".into()))?;
        self.check_shape(&request)?;

        let key = self.api_keys.authenticate(&request.tenant_id, api_key).await?;

        let scope_key = format!("ingestion:{}", key.id);
        let decision = self
            .rate_limits
            .try_acquire(&scope_key, self.settings.ingestion_rate_capacity)
            .await?;
        if !decision.allowed {
            warn!(key_id = %key.id, retry_after = ?decision.retry_after, "ingestion rate limit hit");
            return Err(IngestError::RateLimited {
                retry_after_ms: u64::try_from(decision.retry_after.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let key_hash = idempotency_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(hash_idempotency_key);

        if let Some(hash) = &key_hash {
            match self.idempotency.reserve(&request.tenant_id, hash, Utc::now()).await? {
                Reservation::Acquired => {}
                Reservation::Replay(response) => {
                    info!(tenant_id = %request.tenant_id, "idempotent replay");
                    return Ok(UpsertOutcome::Replayed(response));
                }
                Reservation::InFlight => return Err(IngestError::IdempotencyConflict),
            }
        }

        let tenant_id = request.tenant_id.clone();
        let result = self.process(request).await;

        if let Some(hash) = &key_hash {
            match &result {
                Ok(response) => {
                    let stored = serde_json::to_value(response).unwrap_or(Value::Null);
                    if let Err(e) = self.idempotency.complete(&tenant_id, hash, &stored).await {
                        // a pending reservation would answer every retry with 409
                        warn!(tenant_id = %tenant_id, "failed to store idempotent response: {e:#}");
                        if let Err(e) = self.idempotency.release(&tenant_id, hash).await {
                            warn!(tenant_id = %tenant_id, "failed to release idempotency key: {e:#}");
                        }
                    }
                }
                Err(_) => {
                    if let Err(e) = self.idempotency.release(&tenant_id, hash).await {
                        warn!(tenant_id = %tenant_id, "failed to release idempotency key: {e:#}");
                    }
                }
            }
        }

        result.map(UpsertOutcome::Completed)
    }

    async fn resolve_owners(&self, tenant_id: &str, leads: &[MappedLead]) -> Result<HashMap<String, String>, IngestError> {
        let emails: BTreeSet<String> = leads
            .iter()
            .filter_map(|lead| lead.owner_email.as_deref())
            .map(normalize_email)
            .collect();

        let found = try_join_all(emails.into_iter().map(|email| async move {
            let user_id = self.directory.find_member_by_email(tenant_id, &email).await?;
            Ok::<_, anyhow::Error>(user_id.map(|id| (email, id)))
        }))
        .await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn process(&self, request: UpsertLeadsRequest) -> Result<UpsertLeadsResponse, IngestError> {
        let tenant_id = request.tenant_id.as_str();
        let campaign_id = request.campaign_id.as_str();

        self.catalog
            .find_campaign(tenant_id, campaign_id)
            .await?
            .ok_or_else(|| IngestError::Forbidden("Campaign not found".into()))?;

        let (statuses, custom_fields) = tokio::try_join!(
            self.catalog.list_statuses(tenant_id),
            self.catalog.list_custom_fields(tenant_id)
        )?;
        let catalog = TenantCatalog::new(statuses, custom_fields);

        let mapped: Vec<MappedLead> = request.leads.into_iter().map(MappedLead::from).collect();
        let owners = self.resolve_owners(tenant_id, &mapped).await?;
        let validator = RowValidator::new(&catalog, &owners, self.settings.lenient_follow_up_dates);

        let mut response = UpsertLeadsResponse::default();
        let mut batch = Vec::with_capacity(mapped.len());
        for (index, lead) in mapped.iter().enumerate() {
            match validator.validate(lead) {
                Ok(valid) => batch.push(valid),
                Err(errors) => {
                    let code = errors.first().map(|e| e.code.as_str()).unwrap_or("PROCESSING_ERROR");
                    response.errors.push(LeadError {
                        index,
                        code: code.to_string(),
                        message: errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
                    });
                    response.skipped += 1;
                }
            }
        }

        let target = IngestTarget {
            tenant_id,
            campaign_id,
            mode: request.dedupe_mode,
            default_status_id: None,
        };
        let (plan, _) = self.pipeline.plan(target, batch).await?;

        if let Err(failure) = self.pipeline.write(&plan).await {
            return Err(IngestError::Persistence {
                message: failure.error.to_string(),
                details: serde_json::json!({ "committed": failure.report }),
            });
        }

        response.created = plan.created;
        response.updated = plan.updated;
        info!(
            tenant_id,
            campaign_id,
            created = response.created,
            updated = response.updated,
            skipped = response.skipped,
            "bulk upsert finished"
        );
        Ok(response)
    }
}
