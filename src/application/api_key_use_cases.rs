//! API key issue, listing, activation and authentication

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::dto::{ApiKeyListResponse, ApiKeyResponse, CreateApiKeyRequest, CreatedApiKeyResponse};
use crate::application::errors::IngestError;
use crate::domain::api_key::ApiKeyRecord;
use crate::domain::repositories::{ApiKeyRepository, TenantDirectory};
use crate::infrastructure::credentials::{generate_api_key, hash_api_key, verify_api_key};

#[derive(Clone)]
pub struct ApiKeyUseCases {
    keys: Arc<dyn ApiKeyRepository>,
    directory: Arc<dyn TenantDirectory>,
    pepper: String,
}

impl ApiKeyUseCases {
    pub fn new(keys: Arc<dyn ApiKeyRepository>, directory: Arc<dyn TenantDirectory>, pepper: impl Into<String>) -> Self {
        Self {
            keys,
            directory,
            pepper: pepper.into(),
        }
    }

    async fn require_admin(&self, tenant_id: &str, user_id: &str) -> Result<(), IngestError> {
        if self.directory.is_tenant_admin(tenant_id, user_id).await? {
            Ok(())
        } else {
            Err(IngestError::Forbidden("Not a tenant admin".into()))
        }
    }

    /// Issue a key. The plaintext is only ever in this response.
    pub async fn issue(
        &self,
        user_id: &str,
        tenant_id: &str,
        request: CreateApiKeyRequest,
    ) -> Result<CreatedApiKeyResponse, IngestError> {
        self.require_admin(tenant_id, user_id).await?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(IngestError::validation("API key name is required"));
        }

        let plaintext_key = generate_api_key();
        let record = ApiKeyRecord {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            key_hash: hash_api_key(&plaintext_key, &self.pepper),
            is_active: true,
            last_used_at: None,
            created_by: Some(user_id.to_string()),
            created_at: Utc::now(),
        };
        self.keys.create(&record).await?;
        info!(tenant_id, key_id = %record.id, "issued API key");

        Ok(CreatedApiKeyResponse {
            api_key: record,
            plaintext_key,
        })
    }

    pub async fn list(&self, user_id: &str, tenant_id: &str) -> Result<ApiKeyListResponse, IngestError> {
        self.require_admin(tenant_id, user_id).await?;
        Ok(ApiKeyListResponse {
            api_keys: self.keys.list_for_tenant(tenant_id).await?,
        })
    }

    pub async fn set_active(
        &self,
        user_id: &str,
        tenant_id: &str,
        key_id: &str,
        is_active: bool,
    ) -> Result<ApiKeyResponse, IngestError> {
        self.require_admin(tenant_id, user_id).await?;
        let api_key = self
            .keys
            .set_active(tenant_id, key_id, is_active)
            .await?
            .ok_or_else(|| IngestError::NotFound("API key not found".into()))?;
        info!(tenant_id, key_id, is_active, "API key status changed");
        Ok(ApiKeyResponse { api_key })
    }

    /// Resolve a presented key for `tenant_id`. Inactive keys and keys of
    /// other tenants are refused alike.
    ///
    /// Stamps `last_used_at` in the background; a failure there only logs.
    pub async fn authenticate(&self, tenant_id: &str, plaintext: &str) -> Result<ApiKeyRecord, IngestError> {
        let presented_hash = hash_api_key(plaintext, &self.pepper);
        let record = self.keys.find_active_by_hash(tenant_id, &presented_hash).await?;

        let Some(record) = record.filter(|r| verify_api_key(plaintext, &self.pepper, &r.key_hash)) else {
            warn!(tenant_id, "API key rejected");
            return Err(IngestError::Unauthorized("Invalid or inactive API key".into()));
        };

        let keys = self.keys.clone();
        let key_id = record.id.clone();
        tokio::spawn(async move {
            if let Err(e) = keys.touch_last_used(&key_id, Utc::now()).await {
                warn!(key_id = %key_id, "failed to record API key use: {e:#}");
            }
        });

        Ok(record)
    }
}
